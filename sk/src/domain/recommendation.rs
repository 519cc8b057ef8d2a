//! Subtasks, worker output and the final recommendation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// The three fixed specialist kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskKind {
    PreferenceAnalysis,
    ConstraintValidation,
    CreativeSolutions,
}

impl SubtaskKind {
    pub const ALL: [SubtaskKind; 3] = [
        SubtaskKind::PreferenceAnalysis,
        SubtaskKind::ConstraintValidation,
        SubtaskKind::CreativeSolutions,
    ];

    /// Wire name, as used in prompts and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskKind::PreferenceAnalysis => "preference_analysis",
            SubtaskKind::ConstraintValidation => "constraint_validation",
            SubtaskKind::CreativeSolutions => "creative_solutions",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            SubtaskKind::PreferenceAnalysis => "preference analysis",
            SubtaskKind::ConstraintValidation => "constraint validation",
            SubtaskKind::CreativeSolutions => "creative solutions",
        }
    }

    /// What a specialist of this kind concentrates on
    pub fn focus(&self) -> &'static str {
        match self {
            SubtaskKind::PreferenceAnalysis => {
                "Weigh each option against the stated preferences and say which preferences it serves or sacrifices."
            }
            SubtaskKind::ConstraintValidation => {
                "Check each option against the stated constraints and flag anything that would violate them."
            }
            SubtaskKind::CreativeSolutions => {
                "Propose unconventional or hybrid options the person may not have considered."
            }
        }
    }
}

impl fmt::Display for SubtaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "SubtaskKind::from_str: called");
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown subtask kind: '{}'", s))
    }
}

/// One unit of specialist work produced by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    #[serde(rename = "type")]
    pub kind: SubtaskKind,
    pub description: String,
}

impl SubtaskSpec {
    pub fn new(kind: SubtaskKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// A single option proposed by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_plan: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Result of one worker; owned by the pool until aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub kind: SubtaskKind,
    result: Result<Vec<Recommendation>, String>,
}

impl WorkerOutcome {
    pub fn succeeded(kind: SubtaskKind, recommendations: Vec<Recommendation>) -> Self {
        Self {
            kind,
            result: Ok(recommendations),
        }
    }

    pub fn failed(kind: SubtaskKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            result: Err(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn recommendations(&self) -> Option<&[Recommendation]> {
        self.result.as_deref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

/// The synthesized answer returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRecommendation {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}
