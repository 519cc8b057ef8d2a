//! Repair error types

use thiserror::Error;

/// Number of characters of the offending text kept for diagnostics
pub const PREFIX_CHARS: usize = 200;

/// Terminal failure: every recovery attempt was exhausted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse AI response as JSON: {reason} (input starts with {prefix:?})")]
pub struct ParseError {
    /// Leading slice of the input, at most [`PREFIX_CHARS`] characters
    pub prefix: String,

    /// Parser message from the last attempt
    pub reason: String,
}

impl ParseError {
    /// Build an error for `input`, keeping only a short prefix of it
    pub fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            prefix: input.chars().take(PREFIX_CHARS).collect(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_truncated() {
        let input = "x".repeat(1000);
        let err = ParseError::new(&input, "EOF while parsing");
        assert_eq!(err.prefix.chars().count(), PREFIX_CHARS);
        assert_eq!(err.reason, "EOF while parsing");
    }

    #[test]
    fn test_prefix_respects_char_boundaries() {
        let input = "é".repeat(300);
        let err = ParseError::new(&input, "bad");
        assert_eq!(err.prefix.chars().count(), PREFIX_CHARS);
        assert!(err.prefix.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_display_mentions_reason() {
        let err = ParseError::new("{oops", "key must be a string");
        let msg = err.to_string();
        assert!(msg.contains("key must be a string"));
        assert!(msg.contains("{oops"));
    }
}
