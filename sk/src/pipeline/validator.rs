//! Terminal shape check on the assembled response

use tracing::{debug, error};

use super::PipelineError;
use super::orchestrator::MAX_TASKS;
use crate::domain::PipelineResponse;

/// Check every rule and report all violations at once
pub fn validate_response(response: &PipelineResponse) -> Result<(), PipelineError> {
    debug!("validate_response: called");
    let mut violations = Vec::new();
    let analysis = &response.analysis;

    if analysis.tasks.is_empty() || analysis.tasks.len() > MAX_TASKS {
        violations.push(format!("analysis.tasks has {} entries, expected 1-{MAX_TASKS}", analysis.tasks.len()));
    }

    if analysis.worker_status.len() != analysis.tasks.len() {
        violations.push(format!(
            "analysis.workerStatus has {} entries for {} tasks",
            analysis.worker_status.len(),
            analysis.tasks.len()
        ));
    }

    for (i, (status, task)) in analysis.worker_status.iter().zip(&analysis.tasks).enumerate() {
        if status.kind != task.kind {
            violations.push(format!(
                "analysis.workerStatus[{i}].type is {} but tasks[{i}].type is {}",
                status.kind, task.kind
            ));
        }
    }

    for (i, status) in analysis.worker_status.iter().enumerate() {
        match (status.success, &status.error) {
            (true, Some(_)) => violations.push(format!("analysis.workerStatus[{i}] succeeded but has an error")),
            (false, None) => violations.push(format!("analysis.workerStatus[{i}] failed without an error")),
            _ => {}
        }
    }

    let fin = &response.final_recommendation;
    if fin.summary.trim().is_empty() {
        violations.push("finalRecommendation.summary is empty".to_string());
    }
    if fin.reasoning.trim().is_empty() {
        violations.push("finalRecommendation.reasoning is empty".to_string());
    }
    if fin.key_points.is_empty() {
        violations.push("finalRecommendation.keyPoints is empty".to_string());
    }

    let lists = [
        ("keyPoints", Some(&fin.key_points)),
        ("nextSteps", fin.next_steps.as_ref()),
        ("resources", fin.resources.as_ref()),
    ];
    for (name, items) in lists {
        for (i, item) in items.into_iter().flatten().enumerate() {
            if item.trim().is_empty() {
                violations.push(format!("finalRecommendation.{name}[{i}] is blank"));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        error!(?violations, "Response failed shape validation");
        Err(PipelineError::SchemaViolation { violations })
    }
}
