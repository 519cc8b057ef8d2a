//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Planning prompt: decompose a decision into subtasks
pub const ORCHESTRATOR: &str = include_str!("../../prompts/orchestrator.pmt");

/// Specialist prompt, rendered once per subtask
pub const WORKER: &str = include_str!("../../prompts/worker.pmt");

/// Merge specialist reports into the final recommendation
pub const SYNTHESIS: &str = include_str!("../../prompts/synthesis.pmt");

/// System message for the conversational coach
pub const CHAT: &str = include_str!("../../prompts/chat.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "orchestrator" => Some(ORCHESTRATOR),
        "worker" => Some(WORKER),
        "synthesis" => Some(SYNTHESIS),
        "chat" => Some(CHAT),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
