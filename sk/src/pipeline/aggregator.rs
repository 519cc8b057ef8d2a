//! Fan-in of worker outcomes and the deterministic fallback

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{FinalRecommendation, Recommendation, SubtaskKind, WorkerOutcome};

/// Characters of the context quoted in the fallback reasoning
const FALLBACK_CONTEXT_CHARS: usize = 100;

/// One successful worker, as handed to synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport<'a> {
    #[serde(rename = "type")]
    pub kind: SubtaskKind,
    pub recommendations: &'a [Recommendation],
}

/// What the pipeline does after the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate<'a> {
    /// At least one worker succeeded
    Synthesize(Vec<WorkerReport<'a>>),
    /// Nobody succeeded; answer without calling the LLM again
    Fallback(FinalRecommendation),
}

/// Filter to successful outcomes, or produce the fallback when there are none
pub fn aggregate<'a>(outcomes: &'a [WorkerOutcome], context: &str) -> Aggregate<'a> {
    debug!(outcome_count = outcomes.len(), "aggregate: called");
    let reports: Vec<WorkerReport<'a>> = outcomes
        .iter()
        .filter_map(|outcome| {
            outcome.recommendations().map(|recommendations| WorkerReport {
                kind: outcome.kind,
                recommendations,
            })
        })
        .collect();

    if reports.is_empty() {
        warn!("All workers failed, providing fallback guidance");
        Aggregate::Fallback(fallback_recommendation(context))
    } else {
        Aggregate::Synthesize(reports)
    }
}

/// The fixed recommendation used when no LLM-generated one is available
pub fn fallback_recommendation(context: &str) -> FinalRecommendation {
    let quoted: String = context.chars().take(FALLBACK_CONTEXT_CHARS).collect();
    FinalRecommendation {
        summary: "Here are thoughtful recommendations based on your decision context.".to_string(),
        reasoning: format!(
            "Given your context \"{quoted}...\", I recommend focusing on a balanced approach that considers both \
             immediate needs and long-term goals. This path offers flexibility while maintaining alignment with \
             your stated preferences and constraints."
        ),
        key_points: to_strings(&[
            "Start with small, reversible steps to test your assumptions",
            "Gather feedback early and often from stakeholders",
            "Document your decision-making process for future reference",
            "Build in checkpoints to reassess and adjust as needed",
        ]),
        next_steps: Some(to_strings(&[
            "Define clear success metrics for your decision",
            "Create a timeline with specific milestones",
            "Identify key stakeholders and communicate your plan",
            "Set up a review process for 30, 60, and 90 days out",
        ])),
        resources: Some(to_strings(&[
            "The Decision Book: 50 Models for Strategic Thinking",
            "Good Strategy Bad Strategy by Richard Rumelt",
            "Thinking in Bets by Annie Duke",
        ])),
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
