use {
    crate::domain::error::PipelineError,
    crate::infra::postgres::activity_log_repo::BatchMode,
    crate::services::consumer::DecodeErrorPolicy,
    std::{env, str::FromStr, time::Duration},
};

/// Durable consumer settings shared by both delivery modes.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub stream: String,
    pub subject: String,
    pub durable: String,
    pub max_deliver: i64,
    pub ack_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub subscription: SubscriptionConfig,
    pub deliver_subject: String,
    pub deliver_group: String,
}

#[derive(Debug, Clone)]
pub struct PullConfig {
    pub subscription: SubscriptionConfig,
    pub fetch_size: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub nats_credentials: Option<(String, String)>,
    pub nats_max_reconnects: usize,
    pub push: PushConfig,
    pub pull: PullConfig,
    pub write_timeout: Duration,
    pub batch_mode: BatchMode,
    pub decode_policy: DecodeErrorPolicy,
    pub dead_letter_subject: String,
    pub skip_older_than: Option<Duration>,
    pub http_addr: String,
}

impl Config {
    /// Read the process environment. Call `dotenvy::dotenv()` first to pick up
    /// a local `.env`.
    pub fn load() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::load`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let vars = Vars { lookup: &lookup };

        let database_url = vars.required("DATABASE_URL")?;
        let stream = vars.string("ACTIVITY_LOG_STREAM", "activitylog");
        let subject = vars.string("ACTIVITY_LOG_SUBJECT", "ActivityLog.Created");
        let max_deliver = vars.parse("ACTIVITY_LOG_MAX_DELIVER", 10_i64)?;
        let ack_wait = Duration::from_secs(vars.parse("ACTIVITY_LOG_ACK_WAIT_SECS", 30_u64)?);

        if max_deliver < 1 {
            return Err(PipelineError::Config(
                "ACTIVITY_LOG_MAX_DELIVER must be at least 1".into(),
            ));
        }

        let subscription = |durable: String| SubscriptionConfig {
            stream: stream.clone(),
            subject: subject.clone(),
            durable,
            max_deliver,
            ack_wait,
        };

        let push = PushConfig {
            subscription: subscription(
                vars.string("ACTIVITY_LOG_PUSH_DURABLE", "durable-activity-log-created"),
            ),
            deliver_subject: vars.string(
                "ACTIVITY_LOG_DELIVER_SUBJECT",
                "deliver.ActivityLogCreated",
            ),
            deliver_group: vars.string("ACTIVITY_LOG_DELIVER_GROUP", "queue-activity-log-created"),
        };

        let pull = PullConfig {
            subscription: subscription(vars.string(
                "ACTIVITY_LOG_PULL_DURABLE",
                "durable-activity-log-created-pull",
            )),
            fetch_size: vars.parse("ACTIVITY_LOG_FETCH_SIZE", 100_usize)?,
            batch_size: vars.parse("ACTIVITY_LOG_BATCH_SIZE", 20_usize)?,
        };

        if pull.fetch_size == 0 || pull.batch_size == 0 {
            return Err(PipelineError::Config(
                "ACTIVITY_LOG_FETCH_SIZE and ACTIVITY_LOG_BATCH_SIZE must be greater than zero"
                    .into(),
            ));
        }
        if push.subscription.durable == pull.subscription.durable {
            return Err(PipelineError::Config(
                "push and pull consumers need distinct durables".into(),
            ));
        }

        let nats_credentials = match (vars.get("NATS_USER"), vars.get("NATS_PASSWORD")) {
            (Some(user), Some(password)) => Some((user, password)),
            (None, None) => None,
            _ => {
                return Err(PipelineError::Config(
                    "NATS_USER and NATS_PASSWORD must be set together".into(),
                ));
            }
        };

        let write_timeout =
            Duration::from_millis(vars.parse("ACTIVITY_LOG_WRITE_TIMEOUT_MS", 5_000_u64)?);
        if write_timeout.is_zero() {
            return Err(PipelineError::Config(
                "ACTIVITY_LOG_WRITE_TIMEOUT_MS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            database_url,
            nats_url: vars.string("NATS_URL", "nats://127.0.0.1:4222"),
            nats_credentials,
            nats_max_reconnects: vars.parse("NATS_MAX_RECONNECTS", 10_usize)?,
            push,
            pull,
            write_timeout,
            batch_mode: vars.parse("ACTIVITY_LOG_BATCH_MODE", BatchMode::Transactional)?,
            decode_policy: vars.parse("ACTIVITY_LOG_DECODE_POLICY", DecodeErrorPolicy::Drop)?,
            dead_letter_subject: vars.string(
                "ACTIVITY_LOG_DEAD_LETTER_SUBJECT",
                "ActivityLog.DeadLetter",
            ),
            skip_older_than: vars
                .parse_optional::<u64>("ACTIVITY_LOG_SKIP_OLDER_THAN_SECS")?
                .map(Duration::from_secs),
            http_addr: vars.string("HTTP_ADDR", "0.0.0.0:3000"),
        })
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, PipelineError> {
        self.get(name)
            .ok_or_else(|| PipelineError::Config(format!("{name} is required")))
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T, PipelineError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_optional(name)?.unwrap_or(default))
    }

    fn parse_optional<T>(&self, name: &str) -> Result<Option<T>, PipelineError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|value| {
                value.parse::<T>().map_err(|error| {
                    PipelineError::Config(format!("invalid {name} value '{value}': {error}"))
                })
            })
            .transpose()
    }
}
