//! Worker pool: one specialist call per subtask, run concurrently
//!
//! Each worker is isolated. A failure, parse error or timeout becomes a
//! failed [`WorkerOutcome`] in that worker's slot and never touches its
//! siblings. The pool itself is bounded by a deadline; when it fires the
//! pending futures are dropped and their slots are filled with a
//! synthetic timeout error.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{FailureStage, PipelineError, complete_json};
use crate::config::PhaseConfig;
use crate::domain::{DecisionRequest, Recommendation, SubtaskSpec, WorkerOutcome};
use crate::llm::LlmClient;
use crate::prompts::{DecisionView, PromptLoader};

/// Error recorded for a worker that yielded nothing usable
pub const NO_RECOMMENDATIONS: &str = "worker returned no complete recommendations";

#[derive(Serialize)]
struct WorkerPromptContext<'a> {
    #[serde(flatten)]
    decision: DecisionView<'a>,
    label: &'static str,
    focus: &'static str,
    description: &'a str,
}

/// Run every subtask concurrently; outcomes are index-aligned with `tasks`
pub async fn run_workers(
    llm: &dyn LlmClient,
    prompts: &PromptLoader,
    phase: &PhaseConfig,
    pool_timeout: Duration,
    request: &DecisionRequest,
    tasks: &[SubtaskSpec],
) -> Vec<WorkerOutcome> {
    debug!(task_count = tasks.len(), ?pool_timeout, "run_workers: called");
    let mut slots: Vec<Option<WorkerOutcome>> = vec![None; tasks.len()];

    let mut pending: FuturesUnordered<_> = tasks
        .iter()
        .enumerate()
        .map(|(index, task)| async move { (index, run_worker(llm, prompts, phase, request, task).await) })
        .collect();

    let deadline = tokio::time::sleep(pool_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            next = pending.next() => match next {
                Some((index, outcome)) => slots[index] = Some(outcome),
                None => break,
            },
            _ = &mut deadline => {
                warn!(
                    pending = pending.len(),
                    timeout_ms = pool_timeout.as_millis() as u64,
                    "Worker pool deadline reached, abandoning pending workers"
                );
                break;
            }
        }
    }
    drop(pending);

    let outcomes: Vec<WorkerOutcome> = slots
        .into_iter()
        .zip(tasks)
        .map(|(slot, task)| {
            slot.unwrap_or_else(|| {
                WorkerOutcome::failed(
                    task.kind,
                    format!("worker timed out after {}ms (pool deadline)", pool_timeout.as_millis()),
                )
            })
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(succeeded, total = outcomes.len(), "Worker pool settled");
    outcomes
}

async fn run_worker(
    llm: &dyn LlmClient,
    prompts: &PromptLoader,
    phase: &PhaseConfig,
    request: &DecisionRequest,
    task: &SubtaskSpec,
) -> WorkerOutcome {
    debug!(kind = %task.kind, "run_worker: called");
    let context = WorkerPromptContext {
        decision: DecisionView::from(request),
        label: task.kind.label(),
        focus: task.kind.focus(),
        description: &task.description,
    };
    let prompt = match prompts.render("worker", &context) {
        Ok(prompt) => prompt,
        Err(e) => {
            warn!(kind = %task.kind, error = %e, "Worker prompt failed to render");
            return WorkerOutcome::failed(task.kind, e.to_string());
        }
    };

    let result = match complete_json(llm, phase, prompt, FailureStage::Workers).await {
        Ok(value) => recommendations_from(value),
        Err(PipelineError::UpstreamTimeout { limit, .. }) => {
            Err(format!("worker timed out after {}ms", limit.as_millis()))
        }
        Err(e) => Err(e.to_string()),
    };

    match result {
        Ok(recommendations) => {
            debug!(kind = %task.kind, count = recommendations.len(), "run_worker: succeeded");
            WorkerOutcome::succeeded(task.kind, recommendations)
        }
        Err(error) => {
            warn!(kind = %task.kind, %error, "Worker failed");
            WorkerOutcome::failed(task.kind, error)
        }
    }
}

/// Pull the valid recommendations out of a repaired worker response
///
/// Elements are deserialized one at a time so a single malformed entry
/// does not sink the rest.
pub fn recommendations_from(value: Value) -> Result<Vec<Recommendation>, String> {
    let Value::Object(mut object) = value else {
        return Err("worker response is not a JSON object".to_string());
    };
    let Some(Value::Array(items)) = object.remove("recommendations") else {
        return Err("worker response has no recommendations array".to_string());
    };

    let total = items.len();
    let recommendations: Vec<Recommendation> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(rec) => Some(rec),
            Err(e) => {
                debug!(error = %e, "recommendations_from: dropping invalid element");
                None
            }
        })
        .collect();

    if recommendations.len() < total {
        warn!(kept = recommendations.len(), total, "Dropped invalid worker recommendations");
    }
    if recommendations.is_empty() {
        return Err(NO_RECOMMENDATIONS.to_string());
    }
    Ok(recommendations)
}
