//! Decision request and its validation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Request body as received over the wire, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDecisionRequest {
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub preferences: Value,
    #[serde(default)]
    pub constraints: Value,
}

/// A validated decision request, immutable for the lifetime of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub context: String,
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl DecisionRequest {
    /// Validate already-typed fields
    pub fn new(
        context: impl Into<String>,
        preferences: Vec<String>,
        constraints: Vec<String>,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            context: context.into(),
            preferences,
            constraints,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check field contents; fails with every violated field listed
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        if self.context.trim().is_empty() {
            violations.push(FieldViolation::new("context", "must be a non-empty string"));
        }
        ValidationError::check(violations)
    }
}

impl TryFrom<RawDecisionRequest> for DecisionRequest {
    type Error = ValidationError;

    fn try_from(raw: RawDecisionRequest) -> Result<Self, Self::Error> {
        debug!("DecisionRequest::try_from: called");
        let mut violations = Vec::new();

        let context = required_string("context", &raw.context, &mut violations);
        let preferences = string_list("preferences", &raw.preferences, &mut violations);
        let constraints = string_list("constraints", &raw.constraints, &mut violations);

        ValidationError::check(violations)?;
        Ok(Self {
            context,
            preferences,
            constraints,
        })
    }
}

/// A single invalid field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Malformed request; never retried, never partially accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid request data: {}", describe(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Ok when nothing was violated
    pub fn check(violations: Vec<FieldViolation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            debug!(count = violations.len(), "ValidationError::check: request rejected");
            Err(Self { violations })
        }
    }

    /// Names of the violated fields, in order
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A string field that must be present and non-blank
pub(crate) fn required_string(field: &str, value: &Value, violations: &mut Vec<FieldViolation>) -> String {
    match value {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::String(_) => {
            violations.push(FieldViolation::new(field, "must be a non-empty string"));
            String::new()
        }
        Value::Null => {
            violations.push(FieldViolation::new(field, "is required"));
            String::new()
        }
        _ => {
            violations.push(FieldViolation::new(field, "must be a string"));
            String::new()
        }
    }
}

/// A string field that may be absent
pub(crate) fn optional_string(field: &str, value: &Value, violations: &mut Vec<FieldViolation>) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        _ => {
            violations.push(FieldViolation::new(field, "must be a string"));
            String::new()
        }
    }
}

/// A list of strings; absent means empty
pub(crate) fn string_list(field: &str, value: &Value, violations: &mut Vec<FieldViolation>) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::String(s) => Some(s.clone()),
                _ => {
                    violations.push(FieldViolation::new(format!("{field}[{i}]"), "must be a string"));
                    None
                }
            })
            .collect(),
        _ => {
            violations.push(FieldViolation::new(field, "must be an array of strings"));
            Vec::new()
        }
    }
}
