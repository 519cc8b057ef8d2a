//! Synthesis stage: merge worker reports into the final recommendation

use jsonrepair::ParseError;
use serde::Serialize;
use tracing::{debug, info};

use super::aggregator::WorkerReport;
use super::{FailureStage, PipelineError, complete_json};
use crate::config::PhaseConfig;
use crate::domain::{DecisionRequest, FinalRecommendation};
use crate::llm::LlmClient;
use crate::prompts::{DecisionView, PromptLoader};

#[derive(Serialize)]
struct SynthesisPromptContext<'a> {
    #[serde(flatten)]
    decision: DecisionView<'a>,
    reports: String,
}

/// One LLM call over the successful reports
///
/// Errors are returned to the caller, which degrades to the fallback.
/// Absent required fields come back empty and are left for response
/// validation to reject.
pub async fn synthesize(
    llm: &dyn LlmClient,
    prompts: &PromptLoader,
    phase: &PhaseConfig,
    request: &DecisionRequest,
    reports: &[WorkerReport<'_>],
) -> Result<FinalRecommendation, PipelineError> {
    debug!(report_count = reports.len(), "synthesize: called");
    let prompt_error = |message: String| PipelineError::Prompt {
        stage: FailureStage::Synthesis,
        template: "synthesis",
        message,
    };

    let reports = serde_json::to_string_pretty(reports).map_err(|e| prompt_error(e.to_string()))?;
    let context = SynthesisPromptContext {
        decision: DecisionView::from(request),
        reports,
    };
    let prompt = prompts
        .render("synthesis", &context)
        .map_err(|e| prompt_error(e.to_string()))?;

    let value = complete_json(llm, phase, prompt, FailureStage::Synthesis).await?;
    let recommendation: FinalRecommendation =
        serde_json::from_value(value.clone()).map_err(|e| PipelineError::Parse {
            stage: FailureStage::Synthesis,
            source: ParseError::new(&value.to_string(), e.to_string()),
        })?;

    info!(key_points = recommendation.key_points.len(), "Synthesis complete");
    Ok(recommendation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Recommendation, SubtaskKind};
    use crate::llm::client::mock::MockLlmClient;
    use serde_json::json;

    fn recs() -> Vec<Recommendation> {
        vec![Recommendation {
            id: "negotiate_first".to_string(),
            title: "Negotiate first".to_string(),
            description: "Ask your current employer for a raise".to_string(),
            pros: vec!["low risk".to_string()],
            cons: vec![],
            action_plan: None,
            timeframe: Some("2 weeks".to_string()),
            tags: None,
        }]
    }

    fn request() -> DecisionRequest {
        DecisionRequest::new("Should I take a new job?", vec![], vec![]).unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_embeds_reports() {
        let reply = json!({
            "summary": "Take the job",
            "reasoning": "Because growth",
            "keyPoints": ["growth"],
            "nextSteps": ["accept"]
        });
        let llm = MockLlmClient::default().reply("synthesis stage", reply.to_string());
        let recs = recs();
        let reports = vec![WorkerReport {
            kind: SubtaskKind::PreferenceAnalysis,
            recommendations: &recs,
        }];

        let fin = synthesize(&llm, &PromptLoader::embedded_only(), &PhaseConfig::default(), &request(), &reports)
            .await
            .unwrap();
        assert_eq!(fin.summary, "Take the job");
        assert!(fin.resources.is_none());

        let prompt = llm.requests()[0].prompt_text();
        assert!(prompt.contains("negotiate_first"));
        assert!(prompt.contains("\"type\": \"preference_analysis\""));
        assert!(prompt.contains("Should I take a new job?"));
    }

    #[tokio::test]
    async fn test_synthesize_shape_mismatch_is_parse_error() {
        let llm = MockLlmClient::default().reply(
            "synthesis stage",
            r#"{"summary": "s", "reasoning": "r", "keyPoints": "not a list"}"#,
        );
        let recs = recs();
        let reports = vec![WorkerReport {
            kind: SubtaskKind::CreativeSolutions,
            recommendations: &recs,
        }];

        let err = synthesize(&llm, &PromptLoader::embedded_only(), &PhaseConfig::default(), &request(), &reports)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
        assert_eq!(err.stage(), FailureStage::Synthesis);
    }

    #[tokio::test]
    async fn test_synthesize_missing_fields_come_back_empty() {
        let llm = MockLlmClient::default().reply("synthesis stage", r#"{"summary": "only a summary"}"#);
        let recs = recs();
        let reports = vec![WorkerReport {
            kind: SubtaskKind::CreativeSolutions,
            recommendations: &recs,
        }];

        let fin = synthesize(&llm, &PromptLoader::embedded_only(), &PhaseConfig::default(), &request(), &reports)
            .await
            .unwrap();
        assert_eq!(fin.summary, "only a summary");
        assert!(fin.reasoning.is_empty());
        assert!(fin.key_points.is_empty());
    }
}
