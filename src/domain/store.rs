use {
    super::activity_log::NewActivityLog,
    super::error::PipelineError,
    std::{future::Future, pin::Pin},
};

/// Result of writing a batch. `applied` counts rows this call made durable,
/// so a rolled back batch reports 0. `already_stored` counts records whose id
/// was in the table before the call; they are settled, not failed.
#[derive(Debug)]
pub struct BatchOutcome {
    pub applied: usize,
    pub already_stored: usize,
    pub first_error: Option<PipelineError>,
}

impl BatchOutcome {
    pub fn complete(applied: usize, already_stored: usize) -> Self {
        Self {
            applied,
            already_stored,
            first_error: None,
        }
    }

    pub fn failed(applied: usize, already_stored: usize, error: PipelineError) -> Self {
        Self {
            applied,
            already_stored,
            first_error: Some(error),
        }
    }

    /// Callers only ever see all-or-nothing: any failure means nothing in the
    /// batch is confirmed, whatever `applied` says.
    pub fn into_result(self) -> Result<usize, PipelineError> {
        match self.first_error {
            None => Ok(self.applied),
            Some(e) => Err(e),
        }
    }
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence of activity logs. Implementations stamp every record before
/// writing and never retry. Writing an id that is already stored succeeds
/// without touching the existing row.
pub trait LogStore: Send + Sync {
    fn insert_one(&self, record: NewActivityLog) -> StoreFuture<'_, Result<(), PipelineError>>;

    fn insert_batch(&self, records: Vec<NewActivityLog>) -> StoreFuture<'_, BatchOutcome>;

    fn insert_many(
        &self,
        records: Vec<NewActivityLog>,
    ) -> StoreFuture<'_, Result<(), PipelineError>> {
        Box::pin(async move { self.insert_batch(records).await.into_result().map(|_| ()) })
    }
}
