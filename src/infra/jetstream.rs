use {
    crate::config::{Config, PullConfig, PushConfig, SubscriptionConfig},
    crate::domain::{
        broker::{BrokerFuture, DeadLetterSink, Delivery, PullSource, PushSource},
        error::PipelineError,
    },
    async_nats::jetstream::{
        self, AckKind,
        consumer::{self, AckPolicy, Consumer, FromConsumer, IntoConsumerConfig, pull, push},
        stream::Stream,
    },
    chrono::{DateTime, Utc},
    futures::StreamExt,
    std::{future::Future, time::Duration},
};

const PROVISION_ATTEMPTS: u32 = 5;
const PROVISION_RETRY_DELAY: Duration = Duration::from_secs(1);
/// How long a pull request waits for the first message before returning empty.
const FETCH_EXPIRES: Duration = Duration::from_secs(1);

pub async fn connect(config: &Config) -> Result<jetstream::Context, PipelineError> {
    let mut options = async_nats::ConnectOptions::new()
        .max_reconnects(config.nats_max_reconnects)
        .event_callback(|event| async move {
            tracing::info!(event = %event, "nats connection event");
        });
    if let Some((user, password)) = &config.nats_credentials {
        options = options.user_and_password(user.clone(), password.clone());
    }

    let client = options
        .connect(config.nats_url.as_str())
        .await
        .map_err(PipelineError::broker)?;
    tracing::info!(url = %config.nats_url, "connected to nats");
    Ok(jetstream::new(client))
}

/// Create the stream if it does not exist yet.
pub async fn ensure_stream(
    js: &jetstream::Context,
    subscription: &SubscriptionConfig,
) -> Result<Stream, PipelineError> {
    with_retry("ensure stream", move || async move {
        js.get_or_create_stream(jetstream::stream::Config {
            name: subscription.stream.clone(),
            subjects: vec![subscription.subject.clone()],
            ..Default::default()
        })
        .await
        .map_err(PipelineError::broker)
    })
    .await
}

pub async fn ensure_push_consumer(
    stream: &Stream,
    config: &PushConfig,
) -> Result<Consumer<push::Config>, PipelineError> {
    let sub = &config.subscription;
    let desired = push::Config {
        durable_name: Some(sub.durable.clone()),
        deliver_subject: config.deliver_subject.clone(),
        deliver_group: Some(config.deliver_group.clone()),
        filter_subject: sub.subject.clone(),
        ack_policy: AckPolicy::Explicit,
        ack_wait: sub.ack_wait,
        max_deliver: sub.max_deliver,
        ..Default::default()
    };
    with_retry("ensure push consumer", move || {
        ensure_consumer(stream, &sub.durable, desired.clone())
    })
    .await
}

pub async fn ensure_pull_consumer(
    stream: &Stream,
    config: &PullConfig,
) -> Result<Consumer<pull::Config>, PipelineError> {
    let sub = &config.subscription;
    let desired = pull::Config {
        durable_name: Some(sub.durable.clone()),
        filter_subject: sub.subject.clone(),
        ack_policy: AckPolicy::Explicit,
        ack_wait: sub.ack_wait,
        max_deliver: sub.max_deliver,
        ..Default::default()
    };
    with_retry("ensure pull consumer", move || {
        ensure_consumer(stream, &sub.durable, desired.clone())
    })
    .await
}

/// Reuse the durable when its delivery settings match, otherwise replace it.
async fn ensure_consumer<C>(
    stream: &Stream,
    durable: &str,
    desired: C,
) -> Result<Consumer<C>, PipelineError>
where
    C: IntoConsumerConfig + FromConsumer + Clone,
{
    let wanted: consumer::Config = desired.clone().into_consumer_config();

    match stream.consumer_info(durable).await {
        Ok(info) if same_delivery(&info.config, &wanted) => {
            return stream
                .get_consumer(durable)
                .await
                .map_err(PipelineError::broker);
        }
        Ok(info) => {
            tracing::warn!(
                durable,
                ack_wait = ?info.config.ack_wait,
                max_deliver = info.config.max_deliver,
                filter_subject = %info.config.filter_subject,
                "deleting consumer with outdated config"
            );
            stream
                .delete_consumer(durable)
                .await
                .map_err(PipelineError::broker)?;
        }
        Err(_) => tracing::info!(durable, "creating consumer"),
    }

    stream
        .create_consumer(desired)
        .await
        .map_err(PipelineError::broker)
}

fn same_delivery(current: &consumer::Config, wanted: &consumer::Config) -> bool {
    current.ack_wait == wanted.ack_wait
        && current.max_deliver == wanted.max_deliver
        && current.filter_subject == wanted.filter_subject
        && current.deliver_subject == wanted.deliver_subject
        && current.deliver_group == wanted.deliver_group
}

async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < PROVISION_ATTEMPTS => {
                tracing::warn!(what, attempt, error = %e, "jetstream provisioning failed, retrying");
                tokio::time::sleep(PROVISION_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A JetStream message waiting to be settled.
pub struct JetStreamDelivery(jetstream::Message);

impl Delivery for JetStreamDelivery {
    fn payload(&self) -> &[u8] {
        &self.0.payload
    }

    fn delivered(&self) -> u64 {
        self.0
            .info()
            .map(|info| u64::try_from(info.delivered).unwrap_or(1))
            .unwrap_or(1)
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        let info = self.0.info().ok()?;
        DateTime::from_timestamp(info.published.unix_timestamp(), info.published.nanosecond())
    }

    fn dedup_key(&self) -> Option<String> {
        let info = self.0.info().ok()?;
        Some(format!("{}/{}", info.stream, info.stream_sequence))
    }

    fn ack(&self) -> BrokerFuture<'_, Result<(), PipelineError>> {
        Box::pin(async move { self.0.ack().await.map_err(PipelineError::broker) })
    }

    fn nak(&self) -> BrokerFuture<'_, Result<(), PipelineError>> {
        Box::pin(async move {
            self.0
                .ack_with(AckKind::Nak(None))
                .await
                .map_err(PipelineError::broker)
        })
    }
}

pub struct JetStreamPush {
    messages: push::Messages,
}

impl JetStreamPush {
    pub async fn subscribe(consumer: &Consumer<push::Config>) -> Result<Self, PipelineError> {
        let messages = consumer.messages().await.map_err(PipelineError::broker)?;
        Ok(Self { messages })
    }
}

impl PushSource for JetStreamPush {
    type Delivery = JetStreamDelivery;

    fn next(&mut self) -> BrokerFuture<'_, Option<Result<JetStreamDelivery, PipelineError>>> {
        Box::pin(async move {
            self.messages.next().await.map(|msg| {
                msg.map(JetStreamDelivery)
                    .map_err(PipelineError::broker)
            })
        })
    }
}

pub struct JetStreamPull {
    consumer: Consumer<pull::Config>,
}

impl JetStreamPull {
    pub fn new(consumer: Consumer<pull::Config>) -> Self {
        Self { consumer }
    }
}

impl PullSource for JetStreamPull {
    type Delivery = JetStreamDelivery;

    fn fetch(&mut self, max: usize) -> BrokerFuture<'_, Result<Vec<JetStreamDelivery>, PipelineError>> {
        Box::pin(async move {
            let mut batch = self
                .consumer
                .batch()
                .max_messages(max)
                .expires(FETCH_EXPIRES)
                .messages()
                .await
                .map_err(PipelineError::broker)?;

            let mut msgs = Vec::with_capacity(max);
            while let Some(msg) = batch.next().await {
                msgs.push(JetStreamDelivery(msg.map_err(PipelineError::broker)?));
            }
            Ok(msgs)
        })
    }
}

/// Republishes rejected bodies with the reason in a header.
pub struct JetStreamDeadLetter {
    js: jetstream::Context,
    subject: String,
}

impl JetStreamDeadLetter {
    pub fn new(js: jetstream::Context, subject: impl Into<String>) -> Self {
        Self {
            js,
            subject: subject.into(),
        }
    }
}

impl DeadLetterSink for JetStreamDeadLetter {
    fn publish<'a>(
        &'a self,
        payload: &'a [u8],
        reason: &'a str,
    ) -> BrokerFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            let mut headers = async_nats::HeaderMap::new();
            headers.insert("Activity-Log-Reject-Reason", reason);
            self.js
                .publish_with_headers(self.subject.clone(), headers, payload.to_vec().into())
                .await
                .map_err(PipelineError::broker)?
                .await
                .map_err(PipelineError::broker)?;
            Ok(())
        })
    }
}
