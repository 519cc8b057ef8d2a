//! SeekHelp - decision recommendations
//!
//! A three-stage LLM pipeline turns a decision context with preferences and
//! constraints into a structured recommendation:
//!
//! - an orchestrator call plans up to three specialist subtasks
//! - one worker call per subtask runs concurrently under a shared deadline
//! - a synthesis call merges the successful reports
//!
//! Every model response passes through the [`jsonrepair`] engine, and the
//! pipeline degrades to a fixed fallback recommendation when no specialist
//! succeeds.
//!
//! # Modules
//!
//! - [`pipeline`] - The recommendation pipeline and its stages
//! - [`llm`] - Completion client trait and OpenAI implementation
//! - [`server`] - HTTP boundary
//! - [`chat`] - Conversational pass-through
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod chat;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod server;

// Re-export commonly used types
pub use config::{Config, LlmConfig, PipelineConfig};
pub use domain::{DecisionRequest, FinalRecommendation, PipelineResponse, Recommendation, SubtaskKind};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use pipeline::{FailureStage, PipelineError, RecommendationPipeline};
pub use prompts::PromptLoader;
