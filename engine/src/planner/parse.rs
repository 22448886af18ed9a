//! Parsing of planner replies.
//!
//! The model is asked for exactly `{"action": null | Action | Action[]}` but
//! routinely wraps it in prose or code fences. The first balanced `{...}`
//! span is extracted and parsed; anything that still does not fit the
//! envelope is a [`ParseError`].

use sdk::types::ProposedAction;
use serde_json::Value;
use thiserror::Error;

use crate::llm::extract_balanced_json;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Reply contains no JSON object")]
    NoJsonObject,

    #[error("Reply JSON is invalid: {0}")]
    InvalidJson(String),

    #[error("Reply JSON has no 'action' field")]
    MissingActionField,

    #[error("Reply 'action' value is not an action: {0}")]
    InvalidAction(String),
}

/// What the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerReply {
    /// `null`: the episode is complete
    Done,
    Single(ProposedAction),
    /// Executed in order by the coordinator
    Batch(Vec<ProposedAction>),
}

pub fn parse(text: &str) -> Result<PlannerReply, ParseError> {
    let json = extract_balanced_json(text).ok_or(ParseError::NoJsonObject)?;
    let envelope: Value =
        serde_json::from_str(json).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let action = envelope
        .as_object()
        .and_then(|object| object.get("action"))
        .ok_or(ParseError::MissingActionField)?;

    match action {
        Value::Null => Ok(PlannerReply::Done),
        Value::Object(_) => Ok(PlannerReply::Single(proposed_action(action)?)),
        // An empty batch has nothing left to do.
        Value::Array(items) if items.is_empty() => Ok(PlannerReply::Done),
        Value::Array(items) => items
            .iter()
            .map(proposed_action)
            .collect::<Result<Vec<_>, _>>()
            .map(PlannerReply::Batch),
        other => Err(ParseError::InvalidAction(format!(
            "expected null, an object or an array, got {}",
            other
        ))),
    }
}

fn proposed_action(value: &Value) -> Result<ProposedAction, ParseError> {
    if !value.is_object() {
        return Err(ParseError::InvalidAction(format!(
            "batch element is not an object: {}",
            value
        )));
    }
    serde_json::from_value(value.clone()).map_err(|e| ParseError::InvalidAction(e.to_string()))
}
