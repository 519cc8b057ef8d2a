//! Conversational pass-through
//!
//! A single streaming completion per turn, with a coaching system message,
//! a bounded history window and an injected follow-up question. Nothing is
//! stored between turns.

mod followup;
mod request;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use followup::{FOLLOW_UP_QUESTIONS, follow_up_question, needs_follow_up};
pub use request::{ChatRequest, ContextDelta, RawChatRequest};

use crate::config::ChatConfig;
use crate::domain::ValidationError;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, StreamChunk};
use crate::prompts::PromptLoader;

/// Sent in place of the sentinel when the provider fails mid-stream
pub const STREAM_INTERRUPTED: &str = "Stream interrupted";

const CHANNEL_CAPACITY: usize = 64;

/// Errors raised before any chunk has been streamed
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to render chat prompt: {0}")]
    Prompt(String),

    #[error(transparent)]
    Upstream(#[from] LlmError),

    #[error("Chat stream task failed: {0}")]
    Task(String),
}

impl ChatError {
    /// HTTP status for this error
    pub fn status(&self) -> u16 {
        match self {
            ChatError::Validation(_) => 400,
            ChatError::Upstream(e) => e.status().unwrap_or(500),
            ChatError::Prompt(_) | ChatError::Task(_) => 500,
        }
    }
}

/// One frame of the reply stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A piece of reply text
    Content(String),
    /// The provider failed after streaming began
    Error(String),
    /// End of stream
    Done,
}

#[derive(Serialize)]
struct ChatPromptContext<'a> {
    context: &'a str,
    preferences: &'a [String],
    constraints: &'a [String],
    delta: Option<&'a ContextDelta>,
}

/// Stateless chat service shared by every request
pub struct ChatService {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: ChatConfig) -> Self {
        debug!(model = %config.model, "ChatService::new: called");
        Self { llm, prompts, config }
    }

    /// Render the coaching system message, including any context delta
    pub fn system_message(&self, request: &ChatRequest) -> Result<String, ChatError> {
        debug!("ChatService::system_message: called");
        let context = ChatPromptContext {
            context: &request.context,
            preferences: &request.preferences,
            constraints: &request.constraints,
            delta: request.context_delta.as_ref().filter(|d| !d.is_empty()),
        };
        self.prompts
            .render("chat", &context)
            .map_err(|e| ChatError::Prompt(e.to_string()))
    }

    /// Build the provider request: system message, history window, then the new turn
    pub fn build_request(&self, request: &ChatRequest) -> Result<CompletionRequest, ChatError> {
        let system_prompt = self.system_message(request)?;
        let window = self.config.history_window;
        let history = &request.previous_messages;
        let skip = history.len().saturating_sub(window);

        let mut messages: Vec<Message> = history[skip..].to_vec();
        messages.push(Message::user(request.message.clone()));
        debug!(history = history.len(), forwarded = messages.len() - 1, "ChatService::build_request: called");

        Ok(CompletionRequest {
            model: self.config.model.clone(),
            system_prompt,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            json_mode: false,
        })
    }

    /// Start streaming a reply
    ///
    /// Waits for the first chunk so a provider failure before any text is
    /// returned as an error rather than as a stream frame.
    pub async fn start(&self, request: ChatRequest) -> Result<mpsc::Receiver<ChatEvent>, ChatError> {
        debug!("ChatService::start: called");
        let completion = self.build_request(&request)?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let llm = self.llm.clone();
        let upstream = tokio::spawn(async move { llm.stream(completion, chunk_tx).await });

        let Some(first) = chunk_rx.recv().await else {
            // The sender is gone, so the provider call has already finished
            return match upstream.await {
                Ok(Ok(_)) => {
                    let (event_tx, event_rx) = mpsc::channel(1);
                    let _ = event_tx.send(ChatEvent::Done).await;
                    Ok(event_rx)
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Chat completion failed before streaming");
                    Err(ChatError::Upstream(e))
                }
                Err(e) => Err(ChatError::Task(e.to_string())),
            };
        };

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(relay(first, chunk_rx, upstream, event_tx, request.context));
        Ok(event_rx)
    }
}

/// Forward provider chunks as events, then append the follow-up and the sentinel
async fn relay(
    first: StreamChunk,
    mut chunk_rx: mpsc::Receiver<StreamChunk>,
    upstream: JoinHandle<Result<CompletionResponse, LlmError>>,
    event_tx: mpsc::Sender<ChatEvent>,
    context: String,
) {
    let mut reply = String::new();
    let mut next = Some(first);

    while let Some(chunk) = next {
        if let StreamChunk::TextDelta(text) = chunk
            && !text.is_empty()
        {
            reply.push_str(&text);
            if event_tx.send(ChatEvent::Content(text)).await.is_err() {
                debug!("relay: client went away");
                upstream.abort();
                return;
            }
        }
        next = chunk_rx.recv().await;
    }

    let closing = match upstream.await {
        Ok(Ok(_)) => {
            if needs_follow_up(&reply) {
                let question = follow_up_question(&context);
                let _ = event_tx.send(ChatEvent::Content(format!(" {question}"))).await;
            }
            info!(reply_len = reply.len(), "Chat reply streamed");
            ChatEvent::Done
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Chat stream interrupted");
            ChatEvent::Error(STREAM_INTERRUPTED.to_string())
        }
        Err(e) => {
            warn!(error = %e, "Chat stream task failed");
            ChatEvent::Error(STREAM_INTERRUPTED.to_string())
        }
    };
    let _ = event_tx.send(closing).await;
}
