//! Domain types for SeekHelp
//!
//! Requests, subtasks, worker output and the response shape shared by the
//! pipeline, the HTTP boundary and the CLI.

mod recommendation;
mod request;
mod response;

pub use recommendation::{FinalRecommendation, Recommendation, SubtaskKind, SubtaskSpec, WorkerOutcome};
pub(crate) use request::{optional_string, required_string, string_list};
pub use request::{DecisionRequest, FieldViolation, RawDecisionRequest, ValidationError};
pub use response::{AnalysisReport, PipelineResponse, WorkerStatus};
