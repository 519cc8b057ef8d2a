//! Chat request body and its validation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{FieldViolation, ValidationError, optional_string, required_string, string_list};
use crate::llm::Message;

/// Preferences and constraints changed since the previous turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextDelta {
    pub added_preferences: Vec<String>,
    pub added_constraints: Vec<String>,
    pub removed_preferences: Vec<String>,
    pub removed_constraints: Vec<String>,
}

impl ContextDelta {
    pub fn is_empty(&self) -> bool {
        self.added_preferences.is_empty()
            && self.added_constraints.is_empty()
            && self.removed_preferences.is_empty()
            && self.removed_constraints.is_empty()
    }
}

/// Chat body as received over the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawChatRequest {
    pub message: Value,
    pub context: Value,
    pub preferences: Value,
    pub constraints: Value,
    pub previous_messages: Value,
    pub context_delta: Value,
}

/// A validated chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub context: String,
    pub preferences: Vec<String>,
    pub constraints: Vec<String>,
    pub previous_messages: Vec<Message>,
    pub context_delta: Option<ContextDelta>,
}

impl TryFrom<RawChatRequest> for ChatRequest {
    type Error = ValidationError;

    fn try_from(raw: RawChatRequest) -> Result<Self, Self::Error> {
        debug!("ChatRequest::try_from: called");
        let mut violations = Vec::new();

        let message = required_string("message", &raw.message, &mut violations);
        let context = optional_string("context", &raw.context, &mut violations);
        let preferences = string_list("preferences", &raw.preferences, &mut violations);
        let constraints = string_list("constraints", &raw.constraints, &mut violations);
        let previous_messages = message_list(&raw.previous_messages, &mut violations);

        let context_delta = match raw.context_delta {
            Value::Null => None,
            value => match serde_json::from_value::<ContextDelta>(value) {
                Ok(delta) => Some(delta),
                Err(_) => {
                    violations.push(FieldViolation::new("contextDelta", "must be an object of string lists"));
                    None
                }
            },
        };

        ValidationError::check(violations)?;
        Ok(Self {
            message,
            context,
            preferences,
            constraints,
            previous_messages,
            context_delta,
        })
    }
}

fn message_list(value: &Value, violations: &mut Vec<FieldViolation>) -> Vec<Message> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value::<Message>(item.clone()) {
                Ok(message) => Some(message),
                Err(_) => {
                    violations.push(FieldViolation::new(
                        format!("previousMessages[{i}]"),
                        "must be {role: user|assistant, content: string}",
                    ));
                    None
                }
            })
            .collect(),
        _ => {
            violations.push(FieldViolation::new("previousMessages", "must be an array of messages"));
            Vec::new()
        }
    }
}
