use {
    super::id::{ActivityLogId, ResourcePath},
    chrono::{DateTime, Utc},
    serde::Serialize,
};

/// An activity log as handed to the store. `id` may still be empty; the store
/// fills it in together with the insert timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivityLog {
    pub id: String,
    pub user_id: String,
    pub action_type: String,
    pub payload: Vec<u8>,
    pub resource_path: ResourcePath,
    pub request_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
}

impl NewActivityLog {
    /// Assign the id (if missing) and the insert timestamps. Both timestamps
    /// come from the same `now`.
    pub fn stamp(self, now: DateTime<Utc>) -> ActivityLog {
        let id = match ActivityLogId::new(self.id) {
            Ok(id) => id,
            Err(_) => ActivityLogId::generate(),
        };

        ActivityLog {
            id,
            user_id: self.user_id,
            action_type: self.action_type,
            payload: self.payload,
            resource_path: self.resource_path,
            request_at: self.request_at,
            finished_at: self.finished_at,
            status: self.status,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A stamped activity log, exactly as it is written to `activity_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLog {
    pub id: ActivityLogId,
    pub user_id: String,
    pub action_type: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub resource_path: ResourcePath,
    pub request_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}
