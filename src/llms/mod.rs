//! Model clients.
//!
//! - [`base_llm`] - the [`BaseLLM`] trait every client implements
//! - [`providers`] - concrete clients (OpenAI-compatible chat completions)

pub mod base_llm;
pub mod providers;

#[cfg(test)]
pub(crate) mod testing;

pub use base_llm::{BaseLLM, BaseLLMState, LLMError, LLMMessage, LLMResponse, StructuredOutput, TokenUsage};
