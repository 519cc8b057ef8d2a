//! Recommendation pipeline
//!
//! One orchestrator call plans up to three subtasks, one worker call per
//! subtask runs concurrently, and one synthesis call merges the successful
//! reports. Every call is time-boxed, every response goes through the JSON
//! repair engine, and the assembled response is shape-checked before it is
//! returned.
//!
//! ```text
//! Validating -> Orchestrating -> FanningOut -> Aggregating
//!     -> (Synthesizing | FallbackOnly) -> ValidatingResponse -> Done
//! ```

pub mod aggregator;
pub mod budget;
mod error;
pub mod orchestrator;
pub mod synthesis;
pub mod validator;
pub mod workers;

use std::fmt;
use std::sync::Arc;

use jsonrepair::Strategy;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

pub use aggregator::{Aggregate, WorkerReport, aggregate, fallback_recommendation};
pub use budget::{TimedOut, attribute_stage, with_timeout};
pub use error::{FailureStage, PipelineError};
pub use orchestrator::Plan;
pub use validator::validate_response;

use crate::config::{PhaseConfig, PipelineConfig};
use crate::domain::{AnalysisReport, DecisionRequest, PipelineResponse, RawDecisionRequest, WorkerStatus};
use crate::llm::{CompletionRequest, LlmClient, Message, StopReason};
use crate::prompts::PromptLoader;

/// System prompt for every structured-output call
pub const JSON_SYSTEM_PROMPT: &str = "Respond ONLY with valid JSON.";

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    Orchestrating,
    FanningOut,
    Aggregating,
    Synthesizing,
    FallbackOnly,
    ValidatingResponse,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Validating => "validating",
            PipelineStage::Orchestrating => "orchestrating",
            PipelineStage::FanningOut => "fanning-out",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::FallbackOnly => "fallback-only",
            PipelineStage::ValidatingResponse => "validating-response",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(stage: PipelineStage) {
    info!(%stage, "Pipeline stage");
}

/// The only entry point consumed by the HTTP boundary and the CLI
pub struct RecommendationPipeline {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    config: PipelineConfig,
}

impl RecommendationPipeline {
    /// Create a pipeline; `config` is fixed for its lifetime
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: PipelineConfig) -> Self {
        debug!(?config, "RecommendationPipeline::new: called");
        Self { llm, prompts, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate a wire request, then run it
    pub async fn run_raw(&self, raw: RawDecisionRequest) -> Result<PipelineResponse, PipelineError> {
        debug!("RecommendationPipeline::run_raw: called");
        let request = DecisionRequest::try_from(raw)?;
        self.run(&request).await
    }

    /// Run one request through every stage under the total budget
    pub async fn run(&self, request: &DecisionRequest) -> Result<PipelineResponse, PipelineError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline", %run_id);

        async {
            info!(context_len = request.context.len(), "Pipeline run started");
            let started = Instant::now();
            let result = match with_timeout(self.execute(request), self.config.total_budget()).await {
                Ok(result) => result,
                Err(TimedOut { limit }) => {
                    let stage = attribute_stage(started.elapsed(), &self.config);
                    error!(%stage, "Pipeline exceeded its total budget");
                    Err(PipelineError::UpstreamTimeout { stage, limit })
                }
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => info!(elapsed_ms, "Pipeline run finished"),
                Err(e) => error!(elapsed_ms, stage = %e.stage(), error = %e, "Pipeline run failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, request: &DecisionRequest) -> Result<PipelineResponse, PipelineError> {
        enter(PipelineStage::Validating);
        request.validate()?;

        enter(PipelineStage::Orchestrating);
        let plan = orchestrator::plan(self.llm.as_ref(), &self.prompts, &self.config.orchestrator, request).await?;

        enter(PipelineStage::FanningOut);
        let outcomes = workers::run_workers(
            self.llm.as_ref(),
            &self.prompts,
            &self.config.worker,
            self.config.worker_pool_timeout(),
            request,
            &plan.tasks,
        )
        .await;

        enter(PipelineStage::Aggregating);
        let final_recommendation = match aggregate(&outcomes, &request.context) {
            Aggregate::Fallback(fallback) => {
                enter(PipelineStage::FallbackOnly);
                fallback
            }
            Aggregate::Synthesize(reports) => {
                enter(PipelineStage::Synthesizing);
                match synthesis::synthesize(
                    self.llm.as_ref(),
                    &self.prompts,
                    &self.config.synthesis,
                    request,
                    &reports,
                )
                .await
                {
                    Ok(recommendation) => recommendation,
                    Err(e) => {
                        warn!(error = %e, "Synthesis failed, using fallback recommendation");
                        enter(PipelineStage::FallbackOnly);
                        fallback_recommendation(&request.context)
                    }
                }
            }
        };

        let worker_status = outcomes.iter().map(WorkerStatus::from).collect();
        let response = PipelineResponse {
            analysis: AnalysisReport {
                analysis: plan.analysis,
                tasks: plan.tasks,
                worker_status,
            },
            final_recommendation,
        };

        enter(PipelineStage::ValidatingResponse);
        validate_response(&response)?;

        enter(PipelineStage::Done);
        Ok(response)
    }
}

/// One time-boxed structured-output call, repaired into a JSON value
pub(crate) async fn complete_json(
    llm: &dyn LlmClient,
    phase: &PhaseConfig,
    prompt: String,
    stage: FailureStage,
) -> Result<Value, PipelineError> {
    debug!(%stage, model = %phase.model, "complete_json: called");
    let request = CompletionRequest {
        model: phase.model.clone(),
        system_prompt: JSON_SYSTEM_PROMPT.to_string(),
        messages: vec![Message::user(prompt)],
        max_tokens: phase.max_tokens,
        temperature: phase.temperature,
        json_mode: true,
    };

    let response = match with_timeout(llm.complete(request), phase.timeout()).await {
        Ok(result) => result.map_err(|e| PipelineError::from_llm(stage, e))?,
        Err(TimedOut { limit }) => return Err(PipelineError::UpstreamTimeout { stage, limit }),
    };
    if response.stop_reason == StopReason::MaxTokens {
        debug!(%stage, "complete_json: response hit the token limit");
    }

    let text = response.into_text().map_err(|e| PipelineError::from_llm(stage, e))?;
    let repaired = jsonrepair::repair(&text).map_err(|source| PipelineError::Parse { stage, source })?;
    if repaired.strategy != Strategy::Strict {
        info!(%stage, strategy = %repaired.strategy, "Recovered malformed model output");
    }
    Ok(repaired.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubtaskKind;
    use crate::llm::client::mock::MockLlmClient;
    use serde_json::json;
    use std::time::Duration;

    const PLANNING: &str = "planning stage";
    const SYNTHESIS: &str = "synthesis stage";
    const PREFERENCE: &str = "You are a preference analysis specialist";
    const CONSTRAINT: &str = "You are a constraint validation specialist";
    const CREATIVE: &str = "You are a creative solutions specialist";
    const ANY_WORKER: &str = "specialist helping someone";

    fn plan_json() -> String {
        json!({
            "analysis": "Growth versus financial security",
            "tasks": [
                {"type": "preference_analysis", "description": "Weigh growth"},
                {"type": "constraint_validation", "description": "Check the budget"},
                {"type": "creative_solutions", "description": "Find alternatives"}
            ]
        })
        .to_string()
    }

    fn worker_json(id: &str) -> String {
        json!({
            "recommendations": [{
                "id": id,
                "title": format!("Option {id}"),
                "description": "A concrete option",
                "pros": ["upside"],
                "cons": ["downside"],
                "actionPlan": ["Step 1"],
                "timeframe": "2 weeks"
            }]
        })
        .to_string()
    }

    fn synthesis_json() -> String {
        json!({
            "summary": "Take the new job, after negotiating",
            "reasoning": "It serves growth and stays within budget",
            "keyPoints": ["Growth", "Budget holds"],
            "nextSteps": ["Ask for the offer in writing"],
            "resources": ["Thinking in Bets"]
        })
        .to_string()
    }

    fn request() -> DecisionRequest {
        DecisionRequest::new(
            "Should I take a new job?",
            vec!["growth".to_string()],
            vec!["budget".to_string()],
        )
        .unwrap()
    }

    fn pipeline(llm: Arc<MockLlmClient>) -> RecommendationPipeline {
        RecommendationPipeline::new(llm, Arc::new(PromptLoader::embedded_only()), PipelineConfig::default())
    }

    fn happy_llm() -> MockLlmClient {
        MockLlmClient::default()
            .reply(PLANNING, plan_json())
            .reply(PREFERENCE, worker_json("pref"))
            .reply(CONSTRAINT, worker_json("cons"))
            .reply(CREATIVE, worker_json("idea"))
            .reply(SYNTHESIS, synthesis_json())
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_stages_succeed() {
        let llm = Arc::new(happy_llm());
        let response = pipeline(llm.clone()).run(&request()).await.unwrap();

        let analysis = &response.analysis;
        assert!((1..=3).contains(&analysis.tasks.len()));
        assert_eq!(analysis.worker_status.len(), analysis.tasks.len());
        assert!(analysis.worker_status.iter().all(|s| s.success && s.error.is_none()));
        assert!(!response.final_recommendation.key_points.is_empty());
        assert_eq!(response.final_recommendation.summary, "Take the new job, after negotiating");
        assert_eq!(llm.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_timeout_still_synthesizes() {
        let llm = Arc::new(
            MockLlmClient::default()
                .reply(PLANNING, plan_json())
                .reply(PREFERENCE, worker_json("pref"))
                .reply_after(CONSTRAINT, Duration::from_secs(120), worker_json("cons"))
                .reply(CREATIVE, worker_json("idea"))
                .reply(SYNTHESIS, synthesis_json()),
        );
        let response = pipeline(llm.clone()).run(&request()).await.unwrap();

        let status = &response.analysis.worker_status[1];
        assert_eq!(status.kind, SubtaskKind::ConstraintValidation);
        assert!(!status.success);
        assert!(status.error.is_some());
        assert_eq!(llm.calls_matching(SYNTHESIS), 1);

        let synthesis_prompt = llm
            .requests()
            .into_iter()
            .map(|r| r.prompt_text())
            .find(|p| p.contains(SYNTHESIS))
            .unwrap();
        assert!(synthesis_prompt.contains("Option pref"));
        assert!(!synthesis_prompt.contains("Option cons"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_worker_leaves_others_untouched() {
        let llm = Arc::new(
            MockLlmClient::default()
                .reply(PLANNING, plan_json())
                .reply(PREFERENCE, worker_json("pref"))
                .fail(CONSTRAINT, 502, "bad gateway")
                .reply(CREATIVE, worker_json("idea"))
                .reply(SYNTHESIS, synthesis_json()),
        );
        let response = pipeline(llm).run(&request()).await.unwrap();

        let successes: Vec<bool> = response.analysis.worker_status.iter().map(|s| s.success).collect();
        assert_eq!(successes, vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_workers_fail_uses_fallback_without_synthesis() {
        let llm = Arc::new(
            MockLlmClient::default()
                .reply(PLANNING, plan_json())
                .fail(ANY_WORKER, 500, "down")
                .reply(SYNTHESIS, synthesis_json()),
        );
        let response = pipeline(llm.clone()).run(&request()).await.unwrap();

        assert!(response.analysis.worker_status.iter().all(|s| !s.success));
        assert_eq!(response.final_recommendation, fallback_recommendation("Should I take a new job?"));
        assert_eq!(llm.calls_matching(SYNTHESIS), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_failure_degrades_to_fallback() {
        let llm = Arc::new(
            MockLlmClient::default()
                .reply(PLANNING, plan_json())
                .reply(ANY_WORKER, worker_json("any"))
                .fail(SYNTHESIS, 429, "slow down"),
        );
        let response = pipeline(llm).run(&request()).await.unwrap();

        assert!(response.analysis.worker_status.iter().all(|s| s.success));
        assert_eq!(response.final_recommendation.key_points.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_timeout_is_attributed() {
        let llm = Arc::new(MockLlmClient::default().reply_after(PLANNING, Duration::from_secs(30), plan_json()));
        let err = pipeline(llm.clone()).run(&request()).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.stage(), FailureStage::Orchestrator);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_garbage_is_fatal() {
        let llm = Arc::new(MockLlmClient::default().reply(PLANNING, "I cannot help with that."));
        let err = pipeline(llm).run(&request()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Parse { .. }));
        assert_eq!(err.stage(), FailureStage::Orchestrator);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_synthesis_key_points_is_schema_violation() {
        let llm = Arc::new(
            MockLlmClient::default()
                .reply(PLANNING, plan_json())
                .reply(ANY_WORKER, worker_json("any"))
                .reply(SYNTHESIS, r#"{"summary": "s", "reasoning": "r", "keyPoints": []}"#),
        );
        let err = pipeline(llm).run(&request()).await.unwrap_err();

        assert!(matches!(err, PipelineError::SchemaViolation { .. }));
        assert_eq!(err.stage(), FailureStage::Synthesis);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_synthesis_key_points_is_schema_violation() {
        for cut in [
            r#"{"summary": "s", "reasoning": "r", "keyPoints":"#,
            r#"{"summary": "s", "reasoning": "r", "keyPoints": ["#,
            r#"{"summary": "s", "reasoning": "r""#,
        ] {
            let llm = Arc::new(
                MockLlmClient::default()
                    .reply(PLANNING, plan_json())
                    .reply(ANY_WORKER, worker_json("any"))
                    .truncated(SYNTHESIS, cut),
            );
            let err = pipeline(llm).run(&request()).await.unwrap_err();

            match &err {
                PipelineError::SchemaViolation { violations } => {
                    assert!(violations.contains(&"finalRecommendation.keyPoints is empty".to_string()), "{cut}");
                }
                other => panic!("expected schema violation for {cut}, got {other:?}"),
            }
            assert_eq!(err.stage(), FailureStage::Synthesis);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_type_mismatch_degrades_to_fallback() {
        let llm = Arc::new(
            MockLlmClient::default()
                .reply(PLANNING, plan_json())
                .reply(ANY_WORKER, worker_json("any"))
                .reply(SYNTHESIS, r#"{"summary": "s", "reasoning": "r", "keyPoints": "one big point"}"#),
        );
        let response = pipeline(llm).run(&request()).await.unwrap();

        assert_eq!(response.final_recommendation, fallback_recommendation("Should I take a new job?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_never_calls_llm() {
        let llm = Arc::new(happy_llm());
        let raw: RawDecisionRequest = serde_json::from_value(json!({"context": ""})).unwrap();
        let err = pipeline(llm.clone()).run_raw(raw).await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_budget_backstop() {
        let config = PipelineConfig {
            total_budget_ms: 20_000,
            ..Default::default()
        };
        let llm = Arc::new(
            MockLlmClient::default()
                .reply_after(PLANNING, Duration::from_secs(10), plan_json())
                .reply_after(ANY_WORKER, Duration::from_secs(30), worker_json("slow")),
        );
        let pipeline = RecommendationPipeline::new(llm, Arc::new(PromptLoader::embedded_only()), config);
        let err = pipeline.run(&request()).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.stage(), FailureStage::Workers);
        assert!(err.to_string().contains("20000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_outputs_are_repaired() {
        let llm = Arc::new(
            MockLlmClient::default()
                .truncated(PLANNING, r#"{"analysis": "Jobs", "tasks": [{"type": "creative_solutions", "description": "Alter"#)
                .truncated(
                    CREATIVE,
                    r#"{"recommendations":[{"id":"a","title":"A","description":"D","pros":[],"cons":[]},{"id":"b","#,
                )
                .reply(SYNTHESIS, synthesis_json()),
        );
        let response = pipeline(llm).run(&request()).await.unwrap();

        assert_eq!(response.analysis.tasks.len(), 1);
        assert_eq!(response.analysis.tasks[0].description, "Alter");
        assert!(response.analysis.worker_status[0].success);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::FanningOut.to_string(), "fanning-out");
        assert_eq!(PipelineStage::ValidatingResponse.to_string(), "validating-response");
    }
}
