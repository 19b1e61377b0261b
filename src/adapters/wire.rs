//! Protobuf wire formats of the activity log stream.
//!
//! Push deliveries carry a bare [`ActivityLogEvent`]. Pull deliveries carry a
//! [`DataInMessage`] envelope whose `payload` is the same event type.

use {
    crate::domain::{activity_log::NewActivityLog, error::PipelineError, id::ResourcePath},
    chrono::{DateTime, Utc},
    prost::Message,
};

#[derive(Clone, PartialEq, Message)]
pub struct ActivityLogEvent {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub user_id: String,
    #[prost(string, tag = "3")]
    pub action_type: String,
    #[prost(string, tag = "4")]
    pub resource_path: String,
    #[prost(message, optional, tag = "5")]
    pub request_at: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "6")]
    pub finished_at: Option<prost_types::Timestamp>,
    #[prost(string, tag = "7")]
    pub status: String,
    #[prost(bytes = "vec", tag = "8")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DataInMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: Vec<u8>,
    #[prost(string, tag = "2")]
    pub resource_path: String,
    #[prost(string, tag = "3")]
    pub user_id: String,
}

impl DataInMessage {
    pub fn wrap(event: &ActivityLogEvent) -> Self {
        Self {
            payload: event.encode_to_vec(),
            resource_path: event.resource_path.clone(),
            user_id: event.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Body is the event itself.
    Bare,
    /// Body is a `DataInMessage` whose payload is the event.
    Wrapped,
}

/// Decode one delivery body. For wrapped bodies the envelope's tenant and
/// actor fill in whatever the inner event left empty.
pub fn decode_event(bytes: &[u8], framing: Framing) -> Result<ActivityLogEvent, PipelineError> {
    match framing {
        Framing::Bare => Ok(ActivityLogEvent::decode(bytes)?),
        Framing::Wrapped => {
            let envelope = DataInMessage::decode(bytes)?;
            let mut event = ActivityLogEvent::decode(envelope.payload.as_slice())?;
            if event.resource_path.is_empty() {
                event.resource_path = envelope.resource_path;
            }
            if event.user_id.is_empty() {
                event.user_id = envelope.user_id;
            }
            Ok(event)
        }
    }
}

fn convert_timestamp(
    field: &str,
    ts: Option<prost_types::Timestamp>,
) -> Result<Option<DateTime<Utc>>, PipelineError> {
    let Some(ts) = ts else {
        return Ok(None);
    };
    let nanos = u32::try_from(ts.nanos)
        .map_err(|_| PipelineError::Validation(format!("{field}: negative nanos")))?;
    DateTime::from_timestamp(ts.seconds, nanos)
        .map(Some)
        .ok_or_else(|| PipelineError::Validation(format!("{field}: out of range timestamp")))
}

impl TryFrom<ActivityLogEvent> for NewActivityLog {
    type Error = PipelineError;

    fn try_from(event: ActivityLogEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            resource_path: ResourcePath::new(event.resource_path)?,
            request_at: convert_timestamp("request_at", event.request_at)?,
            finished_at: convert_timestamp("finished_at", event.finished_at)?,
            id: event.id,
            user_id: event.user_id,
            action_type: event.action_type,
            payload: event.payload,
            status: event.status,
        })
    }
}

pub fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}
