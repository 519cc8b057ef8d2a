//! Assembled pipeline response

use serde::{Deserialize, Serialize};

use super::{FinalRecommendation, SubtaskKind, SubtaskSpec, WorkerOutcome};

/// Per-worker success flag, index-aligned with the tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    #[serde(rename = "type")]
    pub kind: SubtaskKind,
    pub success: bool,
    pub error: Option<String>,
}

impl From<&WorkerOutcome> for WorkerStatus {
    fn from(outcome: &WorkerOutcome) -> Self {
        Self {
            kind: outcome.kind,
            success: outcome.is_success(),
            error: outcome.error().map(str::to_string),
        }
    }
}

/// Orchestrator analysis plus what happened to each subtask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub analysis: String,
    pub tasks: Vec<SubtaskSpec>,
    pub worker_status: Vec<WorkerStatus>,
}

/// Body of a successful `POST /recommendations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub analysis: AnalysisReport,
    pub final_recommendation: FinalRecommendation,
}
