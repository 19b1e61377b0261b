use crate::domain::error::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype so the domain error can become an HTTP response.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PipelineError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PipelineError::Decode(err) => (
                StatusCode::BAD_REQUEST,
                "decode_error",
                err.to_string(),
            ),
            PipelineError::Serialization(err) => (
                StatusCode::BAD_REQUEST,
                "serialization_error",
                err.to_string(),
            ),
            PipelineError::Timeout(_) => {
                tracing::error!("storage timeout: {}", self.0);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "timeout",
                    "storage timed out".to_string(),
                )
            }
            PipelineError::Database(_)
            | PipelineError::NoRowsAffected { .. }
            | PipelineError::Broker(_)
            | PipelineError::Config(_) => {
                tracing::error!("internal error: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
