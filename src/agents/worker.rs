//! Worker agents.
//!
//! A worker reads the whole conversation window, may ask for tool calls, and
//! always answers with exactly one assistant message stamped with its own
//! name. It never executes tools itself; the graph's tool node does that.

use std::fmt;
use std::sync::Arc;

use crate::agents::prompts::worker_prompt;
use crate::llms::base_llm::{BaseLLM, LLMError, LLMResponse};
use crate::tools::tool_set::ToolSet;
use crate::types::message::Message;
use crate::types::state::ConversationState;

#[derive(Clone)]
pub struct WorkerAgent {
    name: String,
    system_prompt: String,
    llm: Arc<dyn BaseLLM>,
    tools: Arc<ToolSet>,
}

impl fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("name", &self.name)
            .field("model", &self.llm.model())
            .field("tools", &self.tools.names())
            .finish()
    }
}

impl WorkerAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        llm: Arc<dyn BaseLLM>,
        tools: Arc<ToolSet>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            llm,
            tools,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one turn over the current window.
    ///
    /// Model failures do not escape: malformed tool-call output degrades to
    /// the text the model produced, and any other failure becomes a message
    /// describing it so the supervisor can route around it.
    pub async fn invoke(&self, state: &ConversationState) -> Message {
        let prompt = worker_prompt(&self.system_prompt, &self.tools, &state.messages);
        let tools = if self.tools.is_empty() || !self.llm.supports_function_calling() {
            None
        } else {
            Some(self.tools.function_specs())
        };

        log::debug!(
            "[{}] worker '{}' calling {} with {} messages",
            state.run_id,
            self.name,
            self.llm.model(),
            prompt.len()
        );

        let response = match self.llm.acall(prompt, tools).await {
            Ok(response) => response,
            Err(LLMError::OutputParsing { message, raw }) => {
                log::warn!(
                    "[{}] worker '{}' produced unparseable tool calls, using text: {}",
                    state.run_id,
                    self.name,
                    message
                );
                LLMResponse::text(raw)
            }
            Err(e) => {
                log::warn!("[{}] worker '{}' model call failed: {}", state.run_id, self.name, e);
                LLMResponse::text(format!(
                    "Agent '{}' could not complete its turn: {}",
                    self.name, e
                ))
            }
        };

        let mut message =
            Message::assistant_with_tools(&self.name, response.content, response.tool_calls);
        message.stamp_author(&self.name);
        message
    }
}
