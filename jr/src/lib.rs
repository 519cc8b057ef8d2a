//! JsonRepair - layered recovery of JSON from LLM output
//!
//! Model output that should be JSON is often fenced in Markdown, sprinkled
//! with trailing commas, or cut off mid-structure when the token budget runs
//! out. [`repair`] escalates through four attempts and stops at the first
//! that parses:
//!
//! ```text
//! strict parse -> lexical cleanup -> structural repair -> recommendation salvage
//! ```
//!
//! Recovery is lossy but monotonic: an incomplete trailing fragment may be
//! dropped and open structure closed, but no content is invented.
//!
//! # Example
//!
//! ```
//! use jsonrepair::{Strategy, repair};
//!
//! let repaired = repair(r#"{"summary": "Go", "keyPoints": ["a", "b"#).unwrap();
//! assert_eq!(repaired.strategy, Strategy::Structural);
//! assert_eq!(repaired.value["keyPoints"][1], "b");
//! ```

pub mod cli;
mod cleanup;
mod error;
mod salvage;
mod structural;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

pub use cleanup::lexical_cleanup;
pub use error::{PREFIX_CHARS, ParseError};
pub use structural::{RECOMMENDATIONS_KEY, RepairState, scan_state, structural_repair};

/// Which attempt produced the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Strict,
    Cleaned,
    Structural,
    Salvaged,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Strict => write!(f, "strict"),
            Strategy::Cleaned => write!(f, "cleaned"),
            Strategy::Structural => write!(f, "structural"),
            Strategy::Salvaged => write!(f, "salvaged"),
        }
    }
}

/// A recovered value and the attempt that recovered it
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub value: Value,
    pub strategy: Strategy,
}

impl Repaired {
    fn new(value: Value, strategy: Strategy) -> Self {
        Self { value, strategy }
    }
}

/// Recover a JSON value from `text`
pub fn repair(text: &str) -> Result<Repaired, ParseError> {
    debug!(len = text.len(), "repair: called");

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(Repaired::new(value, Strategy::Strict));
    }

    let cleaned = lexical_cleanup(text);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        debug!("repair: recovered by lexical cleanup");
        return Ok(Repaired::new(value, Strategy::Cleaned));
    }

    let closed = structural_repair(&cleaned);
    let reason = match serde_json::from_str::<Value>(&closed) {
        Ok(value) => {
            debug!("repair: recovered by structural repair");
            return Ok(Repaired::new(value, Strategy::Structural));
        }
        Err(e) => e.to_string(),
    };

    if let Some(value) = salvage::salvage_recommendations(&cleaned) {
        warn!("repair: fell back to recommendation salvage");
        return Ok(Repaired::new(value, Strategy::Salvaged));
    }

    debug!(%reason, "repair: all attempts exhausted");
    Err(ParseError::new(text, reason))
}

/// Recover a JSON value, discarding which attempt succeeded
pub fn parse_lenient(text: &str) -> Result<Value, ParseError> {
    repair(text).map(|repaired| repaired.value)
}

/// Recover a JSON value and deserialize it into `T`
pub fn repair_as<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let value = parse_lenient(text)?;
    serde_json::from_value(value).map_err(|e| ParseError::new(text, e.to_string()))
}
