//! Last-resort recovery for recommendation payloads

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::structural::{RECOMMENDATIONS_KEY, close_open_structures};

static ELEMENT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\s*"id"\s*:\s*"[^"]*""#).expect("valid element regex"));

static ARRAY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""recommendations"\s*:\s*\["#).expect("valid array regex"));

/// Keep the recommendations up to the last structurally complete element,
/// or an empty array when none is complete
pub(crate) fn salvage_recommendations(text: &str) -> Option<Value> {
    if !text.contains(&format!("\"{RECOMMENDATIONS_KEY}\"")) {
        return None;
    }

    let starts: Vec<usize> = ELEMENT_START.find_iter(text).map(|m| m.start()).collect();
    debug!(candidates = starts.len(), "salvage_recommendations: called");

    for &start in starts.iter().rev() {
        let Some(end) = balancing_brace(text, start) else {
            continue;
        };
        let candidate = close_open_structures(&text[..end]);
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Some(value);
        }
    }

    let array = ARRAY_START.find(text)?;
    serde_json::from_str(&close_open_structures(&text[..array.end()])).ok()
}

/// Byte offset just past the `}` that balances the `{` at `start`
fn balancing_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
