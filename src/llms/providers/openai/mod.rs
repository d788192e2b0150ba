//! OpenAI-compatible chat completions client.
//!
//! Talks to any endpoint implementing `POST {base_url}/chat/completions`
//! (OpenRouter by default). Tool calls are parsed here so the rest of the crate
//! only ever sees [`ToolCall`](crate::types::message::ToolCall) values.
//! Structured output is requested by forcing a call to a single function whose
//! parameters are the requested schema.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::agents::parser::parse_wire_tool_calls;
use crate::llms::base_llm::{
    generate_call_id, BaseLLM, BaseLLMState, LLMError, LLMMessage, LLMResponse,
    StructuredOutput, TokenUsage,
};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Chat completions client over `reqwest`.
#[derive(Debug)]
pub struct OpenAICompletion {
    pub state: BaseLLMState,
    /// Request timeout in seconds.
    pub timeout: f64,
    /// Retries after the first attempt for 429, 5xx and connection errors.
    pub max_retries: u32,
    pub max_tokens: Option<u32>,
    pub default_headers: HashMap<String, String>,
    client: reqwest::Client,
    usage: Mutex<TokenUsage>,
}

impl OpenAICompletion {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let mut state = BaseLLMState::new(model);
        state.api_key = api_key;
        state.base_url = base_url;

        Self {
            state,
            timeout: 120.0,
            max_retries: 2,
            max_tokens: None,
            default_headers: HashMap::new(),
            client: reqwest::Client::new(),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.state.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn api_base_url(&self) -> String {
        self.state
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Build the request body for the chat completions endpoint.
    pub fn build_request_body(
        &self,
        messages: &[LLMMessage],
        tools: Option<&[Value]>,
        tool_choice: Option<Value>,
    ) -> Value {
        let mut body = json!({
            "model": self.state.model,
            "messages": messages,
        });

        if let Some(temp) = self.state.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = json!(tools);
            body["tool_choice"] = tool_choice.unwrap_or_else(|| json!("auto"));
        }

        body
    }

    /// Extract content and tool calls from a completions response.
    pub fn parse_completions_response(&self, response: &Value) -> Result<LLMResponse, LLMError> {
        let message = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| self.invalid("no message in first choice"))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let raw_calls = message.get("tool_calls").unwrap_or(&Value::Null);
        let tool_calls = parse_wire_tool_calls(raw_calls).map_err(|e| LLMError::OutputParsing {
            message: e.error,
            raw: if content.trim().is_empty() {
                raw_calls.to_string()
            } else {
                content.clone()
            },
        })?;

        if let Some(usage) = response.get("usage") {
            self.usage.lock().track(usage);
            log::debug!(
                "{} token usage: prompt={}, completion={}",
                self.state.model,
                usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
            );
        }

        Ok(LLMResponse {
            content,
            tool_calls,
        })
    }

    fn invalid(&self, message: impl Into<String>) -> LLMError {
        LLMError::InvalidResponse {
            model: self.state.model.clone(),
            message: message.into(),
        }
    }

    /// POST the body with retries on rate limiting, server errors and
    /// connection failures. Client errors fail immediately.
    async fn send(&self, body: &Value) -> Result<Value, LLMError> {
        let api_key = self
            .state
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LLMError::MissingApiKey {
                provider: self.state.provider.clone(),
            })?;

        let endpoint = format!("{}/chat/completions", self.api_base_url());
        let call_id = generate_call_id();
        log::debug!(
            "LLM call started: model={}, call_id={}, messages={}",
            self.state.model,
            call_id,
            body["messages"].as_array().map_or(0, Vec::len)
        );

        let mut last_error = String::from("no attempt made");
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "LLM retry attempt {} for {} after {:?}: {}",
                    attempt,
                    self.state.model,
                    retry_delay,
                    last_error
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let mut request = self
                .client
                .post(&endpoint)
                .timeout(Duration::from_secs_f64(self.timeout))
                .bearer_auth(api_key);
            for (k, v) in &self.default_headers {
                request = request.header(k, v);
            }

            let response = match request.json(body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = "rate limited (429)".to_string();
                continue;
            }
            if status.is_server_error() {
                last_error = format!("server error: {status}");
                continue;
            }

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            if status.is_client_error() {
                return Err(LLMError::Request {
                    model: self.state.model.clone(),
                    message: format!("{status}: {}", truncate(&text, 500)),
                });
            }

            let json: Value = serde_json::from_str(&text).map_err(|e| {
                self.invalid(format!("{e} - body: {}", truncate(&text, 500)))
            })?;

            if let Some(err) = json.get("error") {
                return Err(LLMError::Request {
                    model: self.state.model.clone(),
                    message: err.to_string(),
                });
            }

            log::debug!("LLM call completed: model={}, call_id={}", self.state.model, call_id);
            return Ok(json);
        }

        log::warn!(
            "LLM call failed: model={}, call_id={}, error={}",
            self.state.model,
            call_id,
            last_error
        );
        Err(LLMError::Request {
            model: self.state.model.clone(),
            message: last_error,
        })
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl BaseLLM for OpenAICompletion {
    fn model(&self) -> &str {
        &self.state.model
    }

    fn provider(&self) -> &str {
        &self.state.provider
    }

    async fn acall(
        &self,
        messages: Vec<LLMMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<LLMResponse, LLMError> {
        let body = self.build_request_body(&messages, tools.as_deref(), None);
        let response = self.send(&body).await?;
        self.parse_completions_response(&response)
    }

    async fn acall_structured(
        &self,
        messages: Vec<LLMMessage>,
        schema: &StructuredOutput,
    ) -> Result<Value, LLMError> {
        let function = json!({
            "type": "function",
            "function": {
                "name": schema.name,
                "description": schema.description,
                "parameters": schema.parameters,
            }
        });
        let choice = json!({"type": "function", "function": {"name": schema.name}});
        let body = self.build_request_body(
            &messages,
            Some(std::slice::from_ref(&function)),
            Some(choice),
        );
        let response = self.send(&body).await?;

        // Some routed models ignore the forced tool choice and answer in text.
        let parsed = match self.parse_completions_response(&response) {
            Ok(parsed) => parsed,
            Err(LLMError::OutputParsing { raw, .. }) => LLMResponse::text(raw),
            Err(e) => return Err(e),
        };
        if let Some(call) = parsed.tool_calls.iter().find(|c| c.name == schema.name) {
            return Ok(call.arguments.clone());
        }
        BaseLLMState::validate_structured_output(&parsed.content)
            .ok_or_else(|| self.invalid(format!("no '{}' object in response", schema.name)))
    }

    fn token_usage(&self) -> TokenUsage {
        *self.usage.lock()
    }
}
