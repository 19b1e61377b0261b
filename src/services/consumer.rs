use {
    super::log_service::LogService,
    crate::adapters::wire::{ActivityLogEvent, Framing, decode_event},
    crate::domain::{
        activity_log::NewActivityLog,
        broker::{DeadLetterSink, Delivery},
        error::PipelineError,
        id::ActivityLogId,
    },
    chrono::Utc,
    std::{str::FromStr, sync::Arc, time::Duration},
};

/// What happens to a message whose body cannot become an activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// Acknowledge and forget it.
    #[default]
    Drop,
    /// Publish the raw body to the dead-letter subject, then acknowledge.
    DeadLetter,
    /// Nak until the message has been delivered `n` times, then drop it.
    RetryN(u64),
}

impl FromStr for DecodeErrorPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "dead_letter" => Ok(Self::DeadLetter),
            other => {
                let n = other
                    .strip_prefix("retry:")
                    .and_then(|n| n.parse::<u64>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        PipelineError::Config(format!("unknown decode error policy: {other}"))
                    })?;
                Ok(Self::RetryN(n))
            }
        }
    }
}

/// Final state of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    /// Nak'd, or left for the ack-wait timer.
    Redeliver,
    Dropped,
    DeadLettered,
    /// Older than the configured age limit.
    Skipped,
    /// Stored, but the ack did not reach the broker. Expect a redelivery.
    AckFailed,
}

/// Applies the decode error policy to one message.
#[derive(Clone)]
pub struct Rejecter {
    policy: DecodeErrorPolicy,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
}

impl Rejecter {
    pub fn new(policy: DecodeErrorPolicy, dead_letter: Option<Arc<dyn DeadLetterSink>>) -> Self {
        Self {
            policy,
            dead_letter,
        }
    }

    pub async fn reject<D: Delivery>(&self, msg: &D, error: &PipelineError) -> Disposition {
        match self.policy {
            DecodeErrorPolicy::Drop => self.drop_message(msg, error).await,
            DecodeErrorPolicy::DeadLetter => {
                let Some(sink) = &self.dead_letter else {
                    tracing::warn!("dead-letter policy without a sink, dropping");
                    return self.drop_message(msg, error).await;
                };
                match sink.publish(msg.payload(), &error.to_string()).await {
                    Ok(()) => {
                        tracing::warn!(error = %error, "undecodable message dead-lettered");
                        ack_quietly(msg).await;
                        Disposition::DeadLettered
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "dead-letter publish failed, requesting redelivery");
                        nak_quietly(msg).await;
                        Disposition::Redeliver
                    }
                }
            }
            DecodeErrorPolicy::RetryN(max) => {
                if msg.delivered() < max {
                    tracing::warn!(
                        delivered = msg.delivered(),
                        max,
                        error = %error,
                        "undecodable message, requesting redelivery"
                    );
                    nak_quietly(msg).await;
                    Disposition::Redeliver
                } else {
                    self.drop_message(msg, error).await
                }
            }
        }
    }

    async fn drop_message<D: Delivery>(&self, msg: &D, error: &PipelineError) -> Disposition {
        tracing::warn!(error = %error, delivered = msg.delivered(), "dropping undecodable message");
        ack_quietly(msg).await;
        Disposition::Dropped
    }
}

async fn ack_quietly<D: Delivery>(msg: &D) -> bool {
    match msg.ack().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "msg ack failed");
            false
        }
    }
}

async fn nak_quietly<D: Delivery>(msg: &D) {
    if let Err(e) = msg.nak().await {
        tracing::error!(error = %e, "msg nak failed");
    }
}

/// Decode a body and give the event an id that survives redelivery: the
/// broker's message identity when it has one, the body bytes otherwise.
fn decode_delivery<D: Delivery>(
    msg: &D,
    framing: Framing,
) -> Result<ActivityLogEvent, PipelineError> {
    let mut event = decode_event(msg.payload(), framing)?;
    if event.id.trim().is_empty() {
        let id = match msg.dedup_key() {
            Some(key) => ActivityLogId::derive(key.as_bytes()),
            None => ActivityLogId::derive(msg.payload()),
        };
        event.id = id.into_inner();
    }
    Ok(event)
}

/// Mode A: one pushed message at a time.
#[derive(Clone)]
pub struct PushHandler {
    service: LogService,
    rejecter: Rejecter,
    framing: Framing,
    skip_older_than: Option<Duration>,
}

impl PushHandler {
    pub fn new(service: LogService, rejecter: Rejecter) -> Self {
        Self {
            service,
            rejecter,
            framing: Framing::Bare,
            skip_older_than: None,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn skip_older_than(mut self, max_age: Option<Duration>) -> Self {
        self.skip_older_than = max_age;
        self
    }

    /// Received → Decoded → Serviced → Acked | Nak'd.
    pub async fn handle<D: Delivery>(&self, msg: &D) -> Disposition {
        if let (Some(max_age), Some(published)) = (self.skip_older_than, msg.published_at()) {
            let too_old = (Utc::now() - published)
                .to_std()
                .is_ok_and(|age| age > max_age);
            if too_old {
                tracing::warn!(published_at = %published, "skipping message older than limit");
                ack_quietly(msg).await;
                return Disposition::Skipped;
            }
        }

        let event = match decode_delivery(msg, self.framing) {
            Ok(event) => event,
            Err(e) => return self.rejecter.reject(msg, &e).await,
        };

        match self.service.create_log(event).await {
            Ok(()) => {
                if ack_quietly(msg).await {
                    Disposition::Acked
                } else {
                    Disposition::AckFailed
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, delivered = msg.delivered(), "create log failed, requesting redelivery");
                nak_quietly(msg).await;
                Disposition::Redeliver
            }
            Err(e) => self.rejecter.reject(msg, &e).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub fetched: usize,
    pub inserted: usize,
    pub skipped: usize,
    /// Stored, but the ack did not reach the broker. Expect a redelivery.
    pub ack_failed: usize,
}

/// Mode B: one fetched group at a time.
#[derive(Clone)]
pub struct PullHandler {
    service: LogService,
    rejecter: Rejecter,
    framing: Framing,
    batch_size: usize,
}

impl PullHandler {
    pub fn new(service: LogService, rejecter: Rejecter, batch_size: usize) -> Self {
        Self {
            service,
            rejecter,
            framing: Framing::Wrapped,
            batch_size: batch_size.max(1),
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Fetched → Chunked → Decoded or Skipped → Bulk-inserted → Acked.
    ///
    /// Undecodable messages are settled by the decode policy on the spot. The
    /// rest are inserted with one bulk call and only acknowledged if it
    /// succeeds; on error none of them are acked and the error is returned.
    pub async fn process_cycle<D: Delivery>(
        &self,
        msgs: &[D],
    ) -> Result<CycleReport, PipelineError> {
        let mut records = Vec::with_capacity(msgs.len());
        let mut decoded = Vec::with_capacity(msgs.len());
        let mut skipped = 0;

        for chunk in msgs.chunks(self.batch_size) {
            for msg in chunk {
                match decode_delivery(msg, self.framing).and_then(NewActivityLog::try_from) {
                    Ok(record) => {
                        records.push(record);
                        decoded.push(msg);
                    }
                    Err(e) => {
                        self.rejecter.reject(msg, &e).await;
                        skipped += 1;
                    }
                }
            }
        }

        let inserted = records.len();
        let mut ack_failed = 0;
        if inserted > 0 {
            self.service.bulk_create_logs(records).await?;
            for msg in decoded {
                if !ack_quietly(msg).await {
                    ack_failed += 1;
                }
            }
        }

        Ok(CycleReport {
            fetched: msgs.len(),
            inserted,
            skipped,
            ack_failed,
        })
    }
}
