//! Tolerant parsing of model output.
//!
//! Models produce tool-call arguments and routing decisions as loosely
//! formatted JSON. The helpers here accept the common deviations (code
//! fences, triple quotes, surrounding prose) and report anything else as an
//! [`OutputParserError`] so callers can degrade instead of failing the run.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::graph::node::Route;
use crate::llms::base_llm::BaseLLMState;
use crate::types::message::ToolCall;

/// Routing keyword that ends the run.
pub const FINISH: &str = "FINISH";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid regex"));

/// Raised when model output cannot be interpreted.
#[derive(Debug, Clone)]
pub struct OutputParserError {
    pub error: String,
}

impl OutputParserError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl fmt::Display for OutputParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputParserError: {}", self.error)
    }
}

impl std::error::Error for OutputParserError {}

/// A supervisor decision as read from structured output.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    /// `None` when the decision is missing or names no known worker.
    pub route: Option<Route>,
    /// The supervisor's visible message, possibly empty.
    pub response: String,
    /// The raw `next` value, kept for logging.
    pub raw_next: Option<String>,
}

/// Parse the `arguments` of a tool call into a JSON object.
///
/// Empty input is an empty object. Strings holding encoded JSON are decoded.
pub fn parse_tool_arguments(raw: &Value) -> Result<Value, OutputParserError> {
    match raw {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(raw.clone()),
        Value::String(text) => parse_arguments_text(text),
        other => Err(OutputParserError::new(format!(
            "tool arguments must be an object, got {other}"
        ))),
    }
}

fn parse_arguments_text(text: &str) -> Result<Value, OutputParserError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let unfenced = match CODE_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or(trimmed, |m| m.as_str()),
        None => trimmed,
    };
    let repaired = safe_repair_json(unfenced);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Ok(Value::Object(map)),
        Ok(Value::String(inner)) if inner.trim_start().starts_with('{') => {
            parse_arguments_text(&inner)
        }
        Ok(other) => Err(OutputParserError::new(format!(
            "tool arguments must be an object, got {other}"
        ))),
        Err(e) => BaseLLMState::validate_structured_output(&repaired).ok_or_else(|| {
            OutputParserError::new(format!("invalid tool arguments JSON: {e}"))
        }),
    }
}

/// Replace the triple quotes some models emit inside JSON strings.
fn safe_repair_json(input: &str) -> String {
    if input.starts_with('[') && input.ends_with(']') {
        return input.to_string();
    }
    let cleaned = input.replace("\"\"\"", "\"");
    if serde_json::from_str::<Value>(&cleaned).is_ok() {
        cleaned
    } else {
        input.to_string()
    }
}

/// Convert OpenAI wire tool calls (`[{id, type, function: {name, arguments}}]`)
/// into [`ToolCall`]s.
///
/// Calls without an id get a generated one so results can still be paired.
pub fn parse_wire_tool_calls(calls: &Value) -> Result<Vec<ToolCall>, OutputParserError> {
    let items = match calls {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(OutputParserError::new(format!(
                "tool_calls must be an array, got {other}"
            )))
        }
    };

    items
        .iter()
        .map(|item| {
            let function = item.get("function").unwrap_or(item);
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| OutputParserError::new("tool call without a function name"))?;
            let arguments =
                parse_tool_arguments(function.get("arguments").unwrap_or(&Value::Null))?;
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
            Ok(ToolCall::new(id, name.trim(), arguments))
        })
        .collect()
}

/// Resolve a worker name against the roster: exact match first, then
/// case-insensitive.
pub fn match_worker(name: &str, workers: &[String]) -> Option<usize> {
    let name = name.trim();
    workers
        .iter()
        .position(|w| w == name)
        .or_else(|| workers.iter().position(|w| w.eq_ignore_ascii_case(name)))
}

/// Read a `{response, next}` object produced by the supervisor.
pub fn parse_route_decision(value: &Value, workers: &[String]) -> RouteDecision {
    let response = ["response", "reasoning", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("")
        .trim()
        .to_string();

    let raw_next = value
        .get("next")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string());

    let route = raw_next.as_deref().and_then(|next| {
        if next.eq_ignore_ascii_case(FINISH) {
            Some(Route::Finish)
        } else {
            match_worker(next, workers).map(Route::Worker)
        }
    });

    RouteDecision {
        route,
        response,
        raw_next,
    }
}
