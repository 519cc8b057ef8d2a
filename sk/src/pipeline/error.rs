//! Pipeline error taxonomy

use std::fmt;
use std::time::Duration;

use jsonrepair::ParseError;
use serde::Serialize;
use thiserror::Error;

use crate::domain::ValidationError;
use crate::llm::LlmError;

/// The pipeline phase a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Validation,
    Orchestrator,
    Workers,
    Synthesis,
    Unknown,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Validation => "validation",
            FailureStage::Orchestrator => "orchestrator",
            FailureStage::Workers => "workers",
            FailureStage::Synthesis => "synthesis",
            FailureStage::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{stage} stage timed out after {}ms", .limit.as_millis())]
    UpstreamTimeout { stage: FailureStage, limit: Duration },

    #[error("{stage} stage failed: {source}")]
    UpstreamApi { stage: FailureStage, source: LlmError },

    #[error("{stage} stage returned unusable output: {source}")]
    Parse { stage: FailureStage, source: ParseError },

    #[error("Orchestrator produced no usable plan: {reason}")]
    InvalidPlan { reason: String },

    #[error("Response failed shape validation: {}", .violations.join("; "))]
    SchemaViolation { violations: Vec<String> },

    #[error("Failed to render {template} prompt: {message}")]
    Prompt {
        stage: FailureStage,
        template: &'static str,
        message: String,
    },
}

impl PipelineError {
    /// The stage reported to the caller
    pub fn stage(&self) -> FailureStage {
        match self {
            PipelineError::Validation(_) => FailureStage::Validation,
            PipelineError::UpstreamTimeout { stage, .. }
            | PipelineError::UpstreamApi { stage, .. }
            | PipelineError::Parse { stage, .. }
            | PipelineError::Prompt { stage, .. } => *stage,
            PipelineError::InvalidPlan { .. } => FailureStage::Orchestrator,
            PipelineError::SchemaViolation { .. } => FailureStage::Synthesis,
        }
    }

    /// Map an LLM error for `stage`, keeping transport timeouts as timeouts
    pub fn from_llm(stage: FailureStage, error: LlmError) -> Self {
        match error {
            LlmError::Timeout(limit) => PipelineError::UpstreamTimeout { stage, limit },
            source => PipelineError::UpstreamApi { stage, source },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::UpstreamTimeout { .. })
    }

    /// Provider status code, when the failure came from the provider
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            PipelineError::UpstreamApi { source, .. } => source.status(),
            _ => None,
        }
    }
}
