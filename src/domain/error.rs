use {std::time::Duration, thiserror::Error};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("decode: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("insert of activity log {id} affected no rows")]
    NoRowsAffected { id: String },

    #[error("database call exceeded {0:?}")]
    Timeout(Duration),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker: {0}")]
    Broker(String),

    #[error("config: {0}")]
    Config(String),
}

impl PipelineError {
    /// Storage-side failures. The consumer redelivers on these and drops on
    /// everything that came out of decoding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::NoRowsAffected { .. } | Self::Timeout(_) | Self::Broker(_)
        )
    }

    pub fn broker(err: impl std::fmt::Display) -> Self {
        Self::Broker(err.to_string())
    }
}
