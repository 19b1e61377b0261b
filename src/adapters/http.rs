use {
    crate::{
        AppState,
        adapters::{
            api_errors::ApiError,
            wire::{ActivityLogEvent, timestamp},
        },
        domain::error::PipelineError,
    },
    axum::{
        Json, Router,
        extract::{DefaultBodyLimit, State},
        http::StatusCode,
        routing::{get, post},
    },
    chrono::{DateTime, Utc},
    serde::Deserialize,
    std::time::Duration,
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

/// JSON body of the synchronous create-log call.
#[derive(Debug, Deserialize)]
pub struct CreateLogRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub action_type: String,
    pub resource_path: String,
    pub request_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TryFrom<CreateLogRequest> for ActivityLogEvent {
    type Error = PipelineError;

    fn try_from(req: CreateLogRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            payload: serde_json::to_vec(&req.payload)?,
            id: req.id,
            user_id: req.user_id,
            action_type: req.action_type,
            resource_path: req.resource_path,
            request_at: req.request_at.map(timestamp),
            finished_at: req.finished_at.map(timestamp),
            status: req.status,
        })
    }
}

pub async fn create_log_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateLogRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let action_type = req.action_type.clone();
    let event = ActivityLogEvent::try_from(req)?;
    state.log_service.create_log(event).await?;

    tracing::info!(action_type = %action_type, "activity log created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"status": "created"})),
    ))
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/v1/activity-logs", post(create_log_handler))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(64 * 1024))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
