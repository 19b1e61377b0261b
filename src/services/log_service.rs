use {
    crate::adapters::wire::ActivityLogEvent,
    crate::domain::{activity_log::NewActivityLog, error::PipelineError, store::LogStore},
    std::sync::Arc,
};

/// Shared entry point for the stream consumers and the HTTP façade.
/// Acknowledgment-agnostic: it only reports success or the store's error.
#[derive(Clone)]
pub struct LogService {
    store: Arc<dyn LogStore>,
}

impl LogService {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub async fn create_log(&self, event: ActivityLogEvent) -> Result<(), PipelineError> {
        let record = NewActivityLog::try_from(event)?;
        self.store.insert_one(record).await
    }

    /// Records are built by the caller; the pull consumer decodes them itself
    /// so it can skip the ones that fail.
    pub async fn bulk_create_logs(&self, records: Vec<NewActivityLog>) -> Result<(), PipelineError> {
        self.store.insert_many(records).await
    }
}
