//! Scripted model client for deterministic tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::llms::base_llm::{BaseLLM, LLMError, LLMMessage, LLMResponse, StructuredOutput};

/// Replays queued answers in order and records every prompt it receives.
///
/// When a queue runs dry, free-text calls answer `"done"` and structured
/// calls answer `{"next": "FINISH"}`.
#[derive(Debug, Default)]
pub struct ScriptedLLM {
    replies: Mutex<VecDeque<Result<LLMResponse, LLMError>>>,
    decisions: Mutex<VecDeque<Result<Value, LLMError>>>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<Vec<LLMMessage>>>,
    pub structured_calls: Mutex<Vec<Vec<LLMMessage>>>,
}

impl ScriptedLLM {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: LLMResponse) -> Self {
        self.replies.lock().push_back(Ok(response));
        self
    }

    pub fn reply_text(self, text: &str) -> Self {
        self.reply(LLMResponse::text(text))
    }

    pub fn fail(self, error: LLMError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    /// Queue a supervisor decision.
    pub fn decide(self, next: &str, response: &str) -> Self {
        self.decisions
            .lock()
            .push_back(Ok(json!({"next": next, "response": response})));
        self
    }

    pub fn decide_raw(self, value: Value) -> Self {
        self.decisions.lock().push_back(Ok(value));
        self
    }

    pub fn fail_decision(self, error: LLMError) -> Self {
        self.decisions.lock().push_back(Err(error));
        self
    }

    /// Sleep this long before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn structured_call_count(&self) -> usize {
        self.structured_calls.lock().len()
    }
}

#[async_trait]
impl BaseLLM for ScriptedLLM {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn acall(
        &self,
        messages: Vec<LLMMessage>,
        _tools: Option<Vec<Value>>,
    ) -> Result<LLMResponse, LLMError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(messages);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(LLMResponse::text("done")))
    }

    async fn acall_structured(
        &self,
        messages: Vec<LLMMessage>,
        _schema: &StructuredOutput,
    ) -> Result<Value, LLMError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.structured_calls.lock().push(messages);
        self.decisions
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({"next": "FINISH"})))
    }
}
