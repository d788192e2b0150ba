//! The supervisor: routes turns between workers and writes the closing answer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::agents::parser::{parse_route_decision, RouteDecision};
use crate::agents::prompts::{route_schema, supervisor_prompt, synthesis_prompt};
use crate::llms::base_llm::{BaseLLM, LLMError, StructuredOutput};
use crate::types::message::Message;
use crate::types::state::ConversationState;
use crate::utilities::string_utils::interpolate_known;

/// Author name of every message the supervisor produces.
pub const SUPERVISOR_NAME: &str = "supervisor";

#[derive(Clone)]
pub struct Supervisor {
    llm: Arc<dyn BaseLLM>,
    workers: Vec<String>,
    system_prompt: String,
    schema: StructuredOutput,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("model", &self.llm.model())
            .field("workers", &self.workers)
            .finish()
    }
}

impl Supervisor {
    /// `{members}` in the system prompt is replaced by the worker roster.
    pub fn new(llm: Arc<dyn BaseLLM>, workers: Vec<String>, system_prompt: &str) -> Self {
        let inputs = HashMap::from([("members", workers.join(", "))]);
        Self {
            llm,
            system_prompt: interpolate_known(system_prompt, &inputs),
            schema: route_schema(&workers),
            workers,
        }
    }

    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Ask for the next route.
    ///
    /// Output that cannot be read as a decision yields a decision without a
    /// route. Only transport-level failures are returned as errors.
    pub async fn decide(&self, state: &ConversationState) -> Result<RouteDecision, LLMError> {
        let prompt = supervisor_prompt(&self.system_prompt, &state.messages, &self.workers);
        match self.llm.acall_structured(prompt, &self.schema).await {
            Ok(value) => {
                let decision = parse_route_decision(&value, &self.workers);
                if decision.route.is_none() {
                    log::warn!(
                        "[{}] supervisor returned an unusable decision: next={:?}",
                        state.run_id,
                        decision.raw_next
                    );
                }
                Ok(decision)
            }
            Err(e @ LLMError::OutputParsing { .. }) | Err(e @ LLMError::InvalidResponse { .. }) => {
                log::warn!("[{}] supervisor decision could not be parsed: {}", state.run_id, e);
                Ok(RouteDecision {
                    route: None,
                    response: String::new(),
                    raw_next: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Write one closing answer from the whole transcript.
    pub async fn synthesize(
        &self,
        transcript: &[Message],
        original_request: &str,
    ) -> Result<Message, LLMError> {
        let prompt = synthesis_prompt(&self.system_prompt, transcript, original_request);
        let response = self.llm.acall(prompt, None).await?;
        let content = response.content.trim();
        if content.is_empty() {
            return Err(LLMError::InvalidResponse {
                model: self.llm.model().to_string(),
                message: "synthesis produced no text".to_string(),
            });
        }
        Ok(Message::assistant(SUPERVISOR_NAME, content))
    }
}
