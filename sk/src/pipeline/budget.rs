//! Deadlines for pipeline phases
//!
//! Every phase races its operation against a timer. The loser is dropped,
//! which abandons waiting; an in-flight HTTP request may still complete
//! remotely and its result is discarded.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::FailureStage;
use crate::config::PipelineConfig;

/// The timer won the race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms", .limit.as_millis())]
pub struct TimedOut {
    pub limit: Duration,
}

/// Race `operation` against `limit`
pub async fn with_timeout<F>(operation: F, limit: Duration) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TimedOut { limit })
}

/// Attribute an overall timeout to a phase from elapsed wall-clock time
///
/// Compares against the cumulative published thresholds: orchestrator,
/// then orchestrator plus the worker pool, then all three phases.
pub fn attribute_stage(elapsed: Duration, config: &PipelineConfig) -> FailureStage {
    let orchestrator = config.orchestrator.timeout();
    let workers = orchestrator + config.worker_pool_timeout();
    let synthesis = workers + config.synthesis.timeout();

    let stage = if elapsed < orchestrator {
        FailureStage::Orchestrator
    } else if elapsed < workers {
        FailureStage::Workers
    } else if elapsed < synthesis {
        FailureStage::Synthesis
    } else {
        FailureStage::Unknown
    };
    debug!(elapsed_ms = elapsed.as_millis() as u64, %stage, "attribute_stage: called");
    stage
}
