//! Planning stage: decompose a decision into typed subtasks

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{FailureStage, PipelineError, complete_json};
use crate::config::PhaseConfig;
use crate::domain::{DecisionRequest, SubtaskKind, SubtaskSpec};
use crate::llm::LlmClient;
use crate::prompts::{DecisionView, PromptLoader};

/// At most this many subtasks are fanned out
pub const MAX_TASKS: usize = 3;

/// Used when the model omits the analysis
pub const DEFAULT_ANALYSIS: &str = "Analysis of your decision context";

/// Orchestrator output after interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub analysis: String,
    pub tasks: Vec<SubtaskSpec>,
}

/// Ask the model for a plan; every failure here is fatal to the run
pub async fn plan(
    llm: &dyn LlmClient,
    prompts: &PromptLoader,
    phase: &PhaseConfig,
    request: &DecisionRequest,
) -> Result<Plan, PipelineError> {
    debug!("plan: called");
    let prompt = prompts
        .render("orchestrator", &DecisionView::from(request))
        .map_err(|e| PipelineError::Prompt {
            stage: FailureStage::Orchestrator,
            template: "orchestrator",
            message: e.to_string(),
        })?;

    let value = complete_json(llm, phase, prompt, FailureStage::Orchestrator).await?;
    let plan = interpret_plan(value)?;
    info!(task_count = plan.tasks.len(), "Orchestrator planned subtasks");
    Ok(plan)
}

/// Turn the repaired orchestrator JSON into a plan of 1 to 3 tasks
///
/// Unknown kinds and non-object entries are dropped; extra tasks are cut.
pub fn interpret_plan(value: Value) -> Result<Plan, PipelineError> {
    debug!("interpret_plan: called");
    let analysis = value
        .get("analysis")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ANALYSIS)
        .to_string();

    let Some(entries) = value.get("tasks").and_then(Value::as_array) else {
        return Err(PipelineError::InvalidPlan {
            reason: "response has no tasks array".to_string(),
        });
    };

    let mut tasks: Vec<SubtaskSpec> = entries.iter().filter_map(interpret_task).collect();
    if tasks.is_empty() {
        return Err(PipelineError::InvalidPlan {
            reason: format!("none of the {} tasks has a known type", entries.len()),
        });
    }
    if tasks.len() > MAX_TASKS {
        warn!(count = tasks.len(), max = MAX_TASKS, "Orchestrator returned too many tasks, truncating");
        tasks.truncate(MAX_TASKS);
    }

    Ok(Plan { analysis, tasks })
}

fn interpret_task(entry: &Value) -> Option<SubtaskSpec> {
    let raw_kind = entry.get("type").and_then(Value::as_str)?;
    let kind: SubtaskKind = match raw_kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            warn!(error = %e, "Dropping orchestrator task");
            return None;
        }
    };

    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| kind.focus());
    Some(SubtaskSpec::new(kind, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use serde_json::json;

    #[test]
    fn test_interpret_plan() {
        let plan = interpret_plan(json!({
            "analysis": "Career growth versus stability",
            "tasks": [
                {"type": "preference_analysis", "description": "Weigh growth"},
                {"type": "constraint_validation", "description": "Check budget"}
            ]
        }))
        .unwrap();

        assert_eq!(plan.analysis, "Career growth versus stability");
        assert_eq!(
            plan.tasks,
            vec![
                SubtaskSpec::new(SubtaskKind::PreferenceAnalysis, "Weigh growth"),
                SubtaskSpec::new(SubtaskKind::ConstraintValidation, "Check budget"),
            ]
        );
    }

    #[test]
    fn test_unknown_kinds_dropped() {
        let plan = interpret_plan(json!({
            "analysis": "a",
            "tasks": [
                {"type": "risk_assessment", "description": "x"},
                "not an object",
                {"type": "creative_solutions", "description": "y"}
            ]
        }))
        .unwrap();
        assert_eq!(plan.tasks, vec![SubtaskSpec::new(SubtaskKind::CreativeSolutions, "y")]);
    }

    #[test]
    fn test_truncated_to_three() {
        let task = json!({"type": "creative_solutions", "description": "d"});
        let plan = interpret_plan(json!({"analysis": "a", "tasks": [task, task, task, task, task]})).unwrap();
        assert_eq!(plan.tasks.len(), MAX_TASKS);
    }

    #[test]
    fn test_defaults() {
        let plan = interpret_plan(json!({"tasks": [{"type": "preference_analysis"}]})).unwrap();
        assert_eq!(plan.analysis, DEFAULT_ANALYSIS);
        assert_eq!(plan.tasks[0].description, SubtaskKind::PreferenceAnalysis.focus());
    }

    #[test]
    fn test_no_tasks_is_invalid_plan() {
        for value in [
            json!({"analysis": "a"}),
            json!({"analysis": "a", "tasks": []}),
            json!({"analysis": "a", "tasks": [{"type": "other"}]}),
        ] {
            let err = interpret_plan(value).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidPlan { .. }));
            assert_eq!(err.stage(), FailureStage::Orchestrator);
        }
    }

    #[tokio::test]
    async fn test_plan_uses_phase_settings() {
        let llm = MockLlmClient::default().reply(
            "planning stage",
            "```json\n{\"analysis\": \"a\", \"tasks\": [{\"type\": \"creative_solutions\", \"description\": \"d\"},]}\n```",
        );
        let phase = PhaseConfig {
            model: "gpt-test".to_string(),
            max_tokens: 512,
            temperature: 0.3,
            timeout_ms: 1000,
        };
        let request = DecisionRequest::new("Move abroad?", vec![], vec![]).unwrap();

        let plan = plan(&llm, &PromptLoader::embedded_only(), &phase, &request).await.unwrap();
        assert_eq!(plan.tasks.len(), 1);

        let sent = &llm.requests()[0];
        assert_eq!(sent.model, "gpt-test");
        assert_eq!(sent.max_tokens, 512);
        assert!(sent.json_mode);
        assert!(sent.prompt_text().contains("Move abroad?"));
    }

    #[tokio::test]
    async fn test_plan_api_error_is_fatal() {
        let llm = MockLlmClient::default().fail("planning stage", 500, "boom");
        let request = DecisionRequest::new("x", vec![], vec![]).unwrap();
        let err = plan(&llm, &PromptLoader::embedded_only(), &PhaseConfig::default(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamApi { .. }));
        assert_eq!(err.stage(), FailureStage::Orchestrator);
    }
}
