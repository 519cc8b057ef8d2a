//! Route handlers

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use futures::Stream;
use futures::stream;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use crate::chat::{ChatEvent, ChatRequest, RawChatRequest};
use crate::domain::{FieldViolation, PipelineResponse, RawDecisionRequest, ValidationError};

/// Terminal frame of every chat stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Parse a body as strict JSON, then into the raw wire type
fn json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ValidationError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| single_violation("body", format!("must be valid JSON ({})", e)))?;
    if !value.is_object() {
        return Err(single_violation("body", "must be a JSON object"));
    }
    serde_json::from_value(value).map_err(|e| single_violation("body", e.to_string()))
}

fn single_violation(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        violations: vec![FieldViolation::new(field, message)],
    }
}

/// `POST /recommendations`
pub async fn recommendations_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PipelineResponse>, ApiError> {
    debug!(body_len = body.len(), "recommendations_handler: called");
    let raw: RawDecisionRequest = json_body(&body).map_err(ApiError::InvalidRequest)?;
    let response = state.pipeline.run_raw(raw).await?;
    Ok(Json(response))
}

/// Validate a vote body and return its score
pub fn vote_score(body: &Value) -> Result<f64, ValidationError> {
    let score = match body.get("score") {
        None | Some(Value::Null) => Err("is required"),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(score) if (-1.0..=1.0).contains(&score) => Ok(score),
            _ => Err("must be between -1 and 1"),
        },
        Some(_) => Err("must be a number"),
    };
    score.map_err(|message| single_violation("score", message))
}

/// `POST /recommendations/:id/vote`
pub async fn vote_handler(Path(id): Path<String>, body: Bytes) -> Result<Json<Value>, ApiError> {
    debug!(%id, "vote_handler: called");
    let body: Value = json_body(&body).map_err(ApiError::InvalidVote)?;
    let score = vote_score(&body).map_err(ApiError::InvalidVote)?;

    info!(recommendation_id = %id, score, timestamp = %Utc::now().to_rfc3339(), "Vote received");
    Ok(Json(json!({"success": true})))
}

/// Convert one chat event into its SSE frame
pub fn sse_frame(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Content(text) => Event::default().data(json!({"content": text}).to_string()),
        ChatEvent::Error(message) => Event::default().data(json!({"error": message}).to_string()),
        ChatEvent::Done => Event::default().data(DONE_SENTINEL),
    }
}

fn event_stream(rx: mpsc::Receiver<ChatEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(sse_frame(event)), rx))
    })
}

/// `POST /chat`
pub async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    debug!(body_len = body.len(), "chat_handler: called");
    let raw: RawChatRequest = json_body(&body).map_err(ApiError::InvalidRequest)?;
    let request = ChatRequest::try_from(raw).map_err(ApiError::InvalidRequest)?;
    let rx = state.chat.start(request).await?;
    Ok(Sse::new(event_stream(rx)))
}
