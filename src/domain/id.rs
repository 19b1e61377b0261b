use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::PipelineError;

/// UUID v5 namespace for ids derived from broker messages.
const ACTIVITY_LOG_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b0e_4d57_4a8e_9c3b_7e51_a0d4_c2f9);

/// Primary key of an activity log row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLogId(String);

impl ActivityLogId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "ActivityLogId must not be blank".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Time-ordered id for events that arrive without one and without a
    /// broker message behind them.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Stable id for a broker message. The same key always gives the same id,
    /// so a redelivery lands on the row the first delivery wrote.
    pub fn derive(key: &[u8]) -> Self {
        Self(Uuid::new_v5(&ACTIVITY_LOG_NAMESPACE, key).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Tenant scoping key (`resource_path`). Every row belongs to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn new(path: impl Into<String>) -> Result<Self, PipelineError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(PipelineError::Validation(
                "resource_path must not be empty".into(),
            ));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourcePath> for String {
    fn from(value: ResourcePath) -> Self {
        value.0
    }
}
