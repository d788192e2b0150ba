//! Language-model abstraction used by the supervisor and the workers.
//!
//! A [`BaseLLM`] offers two calls: a free-text call that may answer with tool
//! calls ([`BaseLLM::acall`]) and a structured call that must answer with an
//! object matching a JSON schema ([`BaseLLM::acall_structured`]). Concrete
//! providers embed [`BaseLLMState`] for the shared bookkeeping.

use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::types::message::ToolCall;

/// A single provider wire message (`{"role": ..., "content": ...}` plus
/// optional `name`, `tool_calls`, `tool_call_id`).
pub type LLMMessage = Value;

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Errors raised by a model client.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Connection failure, timeout or non-success status after retries.
    #[error("LLM request to {model} failed: {message}")]
    Request { model: String, message: String },

    /// The response body could not be interpreted.
    #[error("LLM response from {model} was malformed: {message}")]
    InvalidResponse { model: String, message: String },

    /// The model produced tool calls whose arguments could not be parsed.
    /// `raw` holds whatever text the model produced so callers can degrade to it.
    #[error("LLM tool call output could not be parsed: {message}")]
    OutputParsing { message: String, raw: String },

    /// No API key was configured for the provider.
    #[error("No API key configured for {provider}")]
    MissingApiKey { provider: String },
}

/// Result of a free-text call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LLMResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }
}

/// A named JSON schema the model is asked to fill in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Cumulative token counters for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub successful_requests: i64,
}

impl TokenUsage {
    /// Accumulate an OpenAI-style `usage` object.
    pub fn track(&mut self, usage: &Value) {
        let prompt = usage
            .get("prompt_tokens")
            .or_else(|| usage.get("input_tokens"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let completion = usage
            .get("completion_tokens")
            .or_else(|| usage.get("output_tokens"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.total_tokens += prompt + completion;
        self.successful_requests += 1;
    }
}

/// Interface every model client implements.
///
/// Implementations normalize provider output at this boundary: tool-call
/// arguments arrive parsed, and unparseable tool calls are reported as
/// [`LLMError::OutputParsing`] with the raw text attached.
#[async_trait]
pub trait BaseLLM: Send + Sync + fmt::Debug {
    /// Model identifier sent to the provider.
    fn model(&self) -> &str;

    fn provider(&self) -> &str {
        "openai"
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    /// Free-text completion. `tools` are OpenAI function specs.
    async fn acall(
        &self,
        messages: Vec<LLMMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<LLMResponse, LLMError>;

    /// Completion constrained to `schema`; returns the filled-in object.
    async fn acall_structured(
        &self,
        messages: Vec<LLMMessage>,
        schema: &StructuredOutput,
    ) -> Result<Value, LLMError>;

    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

/// Shared configuration embedded by concrete clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseLLMState {
    pub model: String,
    pub temperature: Option<f64>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub provider: String,
}

impl BaseLLMState {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let provider = Self::extract_provider(&model);
        Self {
            model,
            temperature: None,
            api_key: None,
            base_url: None,
            provider,
        }
    }

    /// Provider prefix of a routed model id (`"anthropic/claude-3"` -> `"anthropic"`).
    pub fn extract_provider(model: &str) -> String {
        match model.find('/') {
            Some(idx) => model[..idx].to_string(),
            None => "openai".to_string(),
        }
    }

    /// Parse a structured answer from free text.
    ///
    /// Tries the whole response as JSON first, then the outermost `{...}` span
    /// (which also covers answers wrapped in code fences).
    pub fn validate_structured_output(response: &str) -> Option<Value> {
        let trimmed = response.trim();
        if trimmed.starts_with('{') {
            if let Ok(val) = serde_json::from_str::<Value>(trimmed) {
                return Some(val);
            }
        }
        JSON_OBJECT
            .find(response)
            .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
            .filter(Value::is_object)
    }
}

/// Fresh identifier for correlating log lines of one call.
pub fn generate_call_id() -> String {
    Uuid::new_v4().to_string()
}
