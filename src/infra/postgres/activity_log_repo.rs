use {
    crate::domain::{
        activity_log::{ActivityLog, NewActivityLog},
        error::PipelineError,
        store::{BatchOutcome, LogStore, StoreFuture},
    },
    chrono::Utc,
    sqlx::{Connection, PgConnection, PgPool},
    std::{future::Future, str::FromStr, time::Duration},
};

const INSERT_ACTIVITY_LOG: &str = r#"
    INSERT INTO activity_logs
        (activity_log_id, user_id, action_type, payload, resource_path,
         request_at, finished_at, status, created_at, updated_at, deleted_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL)
    ON CONFLICT (activity_log_id) DO NOTHING
"#;

const ACTIVITY_LOG_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM activity_logs WHERE activity_log_id = $1)";

/// SQLSTATE raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

/// How `insert_batch` sends its statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// One transaction, rolled back on the first failing statement.
    #[default]
    Transactional,
    /// Statements sent back to back on one connection, each committed on its
    /// own. Rows written before a failure stay written.
    Pipelined,
}

impl FromStr for BatchMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transactional" => Ok(Self::Transactional),
            "pipelined" => Ok(Self::Pipelined),
            other => Err(PipelineError::Config(format!("unknown batch mode: {other}"))),
        }
    }
}

/// What a single insert did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with this id was already there and was left untouched.
    AlreadyStored,
}

#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
    write_timeout: Duration,
    batch_mode: BatchMode,
}

impl PgLogStore {
    pub fn new(pool: PgPool, write_timeout: Duration, batch_mode: BatchMode) -> Self {
        Self {
            pool,
            write_timeout,
            batch_mode,
        }
    }

    /// Client-side bound on a unit of work. Every transaction also carries a
    /// server-side `statement_timeout` of the same length, so work abandoned
    /// here is cancelled and rolled back by Postgres instead of committing.
    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        tokio::time::timeout(self.write_timeout, fut)
            .await
            .map_err(|_| PipelineError::Timeout(self.write_timeout))?
            .map_err(|e| self.cancelled_as_timeout(e))
    }

    fn cancelled_as_timeout(&self, err: PipelineError) -> PipelineError {
        let cancelled = matches!(
            &err,
            PipelineError::Database(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(QUERY_CANCELED)
        );
        if cancelled {
            PipelineError::Timeout(self.write_timeout)
        } else {
            err
        }
    }

    async fn insert_one_inner(&self, record: NewActivityLog) -> Result<(), PipelineError> {
        let log = record.stamp(Utc::now());
        let mut conn = self.pool.acquire().await?;
        if insert_in_own_transaction(&mut conn, &log, self.write_timeout).await?
            == InsertOutcome::AlreadyStored
        {
            tracing::info!(id = %log.id, "activity log already stored, skipping");
        }
        Ok(())
    }

    /// Returns `(applied, already_stored)`. Any error leaves nothing applied.
    async fn insert_transactional(
        &self,
        logs: &[ActivityLog],
    ) -> Result<(usize, usize), PipelineError> {
        let mut tx = self.pool.begin().await?;
        set_statement_timeout(&mut tx, self.write_timeout).await?;

        let (mut applied, mut already_stored) = (0, 0);
        for log in logs {
            match insert_activity_log(&mut tx, log).await? {
                InsertOutcome::Inserted => applied += 1,
                InsertOutcome::AlreadyStored => already_stored += 1,
            }
        }

        tx.commit().await?;
        Ok((applied, already_stored))
    }

    /// Each statement gets its own deadline, so `applied` is exact even when
    /// the batch stops on a timeout.
    async fn insert_pipelined(&self, logs: &[ActivityLog]) -> BatchOutcome {
        let acquired = self
            .with_deadline(async { self.pool.acquire().await.map_err(PipelineError::from) })
            .await;
        let mut conn = match acquired {
            Ok(conn) => conn,
            Err(e) => return BatchOutcome::failed(0, 0, e),
        };

        let (mut applied, mut already_stored) = (0, 0);
        for log in logs {
            let written = self
                .with_deadline(insert_in_own_transaction(&mut conn, log, self.write_timeout))
                .await;
            match written {
                Ok(InsertOutcome::Inserted) => applied += 1,
                Ok(InsertOutcome::AlreadyStored) => already_stored += 1,
                Err(e) => {
                    tracing::warn!(
                        applied,
                        already_stored,
                        total = logs.len(),
                        error = %e,
                        "pipelined batch stopped, earlier rows remain applied"
                    );
                    return BatchOutcome::failed(applied, already_stored, e);
                }
            }
        }
        BatchOutcome::complete(applied, already_stored)
    }
}

async fn set_statement_timeout(
    conn: &mut PgConnection,
    timeout: Duration,
) -> Result<(), PipelineError> {
    sqlx::query("SELECT set_config('statement_timeout', $1, true)")
        .bind(format!("{}ms", timeout.as_millis()))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert and commit one row. Dropping the future before the commit rolls
/// the row back.
async fn insert_in_own_transaction(
    conn: &mut PgConnection,
    log: &ActivityLog,
    timeout: Duration,
) -> Result<InsertOutcome, PipelineError> {
    let mut tx = conn.begin().await?;
    set_statement_timeout(&mut tx, timeout).await?;
    let outcome = insert_activity_log(&mut tx, log).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Insert one stamped row. An existing id is [`InsertOutcome::AlreadyStored`];
/// zero affected rows for a new id is an error.
pub async fn insert_activity_log(
    conn: &mut PgConnection,
    log: &ActivityLog,
) -> Result<InsertOutcome, PipelineError> {
    let result = sqlx::query(INSERT_ACTIVITY_LOG)
        .bind(log.id.as_str())
        .bind(&log.user_id)
        .bind(&log.action_type)
        .bind(&log.payload)
        .bind(log.resource_path.as_str())
        .bind(log.request_at)
        .bind(log.finished_at)
        .bind(&log.status)
        .bind(log.created_at)
        .bind(log.updated_at)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() > 0 {
        return Ok(InsertOutcome::Inserted);
    }

    let exists: bool = sqlx::query_scalar(ACTIVITY_LOG_EXISTS)
        .bind(log.id.as_str())
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        Ok(InsertOutcome::AlreadyStored)
    } else {
        Err(PipelineError::NoRowsAffected {
            id: log.id.as_str().to_string(),
        })
    }
}

impl LogStore for PgLogStore {
    fn insert_one(&self, record: NewActivityLog) -> StoreFuture<'_, Result<(), PipelineError>> {
        Box::pin(async move { self.with_deadline(self.insert_one_inner(record)).await })
    }

    fn insert_batch(&self, records: Vec<NewActivityLog>) -> StoreFuture<'_, BatchOutcome> {
        Box::pin(async move {
            if records.is_empty() {
                return BatchOutcome::complete(0, 0);
            }

            let now = Utc::now();
            let logs: Vec<ActivityLog> = records.into_iter().map(|r| r.stamp(now)).collect();

            let outcome = match self.batch_mode {
                BatchMode::Transactional => {
                    match self.with_deadline(self.insert_transactional(&logs)).await {
                        Ok((applied, already_stored)) => {
                            BatchOutcome::complete(applied, already_stored)
                        }
                        Err(e) => BatchOutcome::failed(0, 0, e),
                    }
                }
                BatchMode::Pipelined => self.insert_pipelined(&logs).await,
            };

            if outcome.already_stored > 0 {
                tracing::info!(
                    already_stored = outcome.already_stored,
                    total = logs.len(),
                    "batch contained activity logs that were already stored"
                );
            }
            outcome
        })
    }
}
