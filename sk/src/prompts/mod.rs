//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for every LLM call.
//!
//! Template loading chain:
//! 1. `{prompts.dir}/{name}.pmt` (configured override)
//! 2. Embedded default compiled into the binary
//!
//! Templates use Handlebars syntax with HTML escaping disabled.

pub mod embedded;
mod loader;

pub use loader::{DecisionView, PromptLoader, TEMPLATE_NAMES};
