//! # crew-graph
//!
//! Supervisor-directed multi-agent orchestration.
//!
//! A crew is one supervisor plus any number of worker agents. For each prompt
//! the supervisor repeatedly picks the worker that should act next, or
//! finishes; workers answer from the shared conversation and may call tools
//! discovered from MCP servers. Visit, message and step limits together with
//! a wall-clock timeout guarantee that every run terminates, and the caller
//! always receives a [`CrewOutput`].
//!
//! - [`run`] is the single entry point over prepared members and tools.
//! - [`Crew::execute_prompt`] builds model clients and discovers tools from
//!   a [`CrewSpec`] first.

pub mod agents;
pub mod cli;
pub mod crew;
pub mod crews;
pub mod graph;
pub mod llm;
pub mod llms;
pub mod mcp;
pub mod server;
pub mod tools;
pub mod types;
pub mod utilities;

pub use crew::{AgentRecord, Crew, CrewSpec};
pub use crews::crew_output::CrewOutput;
pub use graph::{run, CrewGraph, CrewMember, GraphConfig};
pub use llm::LLMConfig;
pub use llms::base_llm::BaseLLM;
pub use tools::{BaseTool, ToolConfig, ToolSet};
pub use types::{ConversationState, Message, ToolCall};
pub use utilities::errors::CrewError;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
