use {
    super::error::PipelineError,
    chrono::{DateTime, Utc},
    std::{future::Future, pin::Pin},
};

pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One message handed to a consumer, still waiting for its ack or nak.
pub trait Delivery: Send + Sync {
    fn payload(&self) -> &[u8];

    /// Delivery attempt, starting at 1.
    fn delivered(&self) -> u64;

    /// When the broker stored the message, if it reports it.
    fn published_at(&self) -> Option<DateTime<Utc>>;

    /// Identity of the stored message, unchanged across redeliveries.
    fn dedup_key(&self) -> Option<String>;

    fn ack(&self) -> BrokerFuture<'_, Result<(), PipelineError>>;

    fn nak(&self) -> BrokerFuture<'_, Result<(), PipelineError>>;
}

/// Continuous push subscription.
pub trait PushSource: Send {
    type Delivery: Delivery;

    /// `None` once the subscription is closed.
    fn next(&mut self) -> BrokerFuture<'_, Option<Result<Self::Delivery, PipelineError>>>;
}

/// Pull subscription fetched in bounded groups.
pub trait PullSource: Send {
    type Delivery: Delivery;

    /// Up to `max` messages; an empty group means nothing was pending.
    fn fetch(&mut self, max: usize) -> BrokerFuture<'_, Result<Vec<Self::Delivery>, PipelineError>>;
}

/// Destination for bodies the decode policy gives up on.
pub trait DeadLetterSink: Send + Sync {
    fn publish<'a>(
        &'a self,
        payload: &'a [u8],
        reason: &'a str,
    ) -> BrokerFuture<'a, Result<(), PipelineError>>;
}
