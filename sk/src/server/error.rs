//! Mapping of service errors onto HTTP responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::chat::ChatError;
use crate::domain::ValidationError;
use crate::pipeline::PipelineError;

/// Errors returned by the HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    /// Malformed recommendation or chat body
    InvalidRequest(ValidationError),
    /// Malformed vote body
    InvalidVote(ValidationError),
    /// The pipeline failed with a stage tag
    Pipeline(PipelineError),
    /// The chat completion failed before streaming
    Chat(ChatError),
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Validation(e) => ApiError::InvalidRequest(e),
            other => ApiError::Pipeline(other),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        match error {
            ChatError::Validation(e) => ApiError::InvalidRequest(e),
            other => ApiError::Chat(other),
        }
    }
}

fn invalid(error: &str, violations: ValidationError) -> Response {
    let body = json!({
        "error": error,
        "details": violations.violations,
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidRequest(e) => invalid("Invalid request data", e),
            ApiError::InvalidVote(e) => invalid("Invalid vote data", e),
            ApiError::Pipeline(e) => {
                let status = if e.is_timeout() {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                let mut body = json!({
                    "error": e.to_string(),
                    "stage": e.stage(),
                });
                if let Some(provider_status) = e.upstream_status() {
                    body["providerStatus"] = json!(provider_status);
                }
                (status, Json(body)).into_response()
            }
            ApiError::Chat(e) => {
                warn!(error = %e, "Chat request failed");
                let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(json!({"error": e.to_string()}))).into_response()
            }
        }
    }
}
