//! Error taxonomy for crew runs.
//!
//! Configuration errors are raised before the state machine starts. Everything
//! else is either recovered locally (parsing, tool failures) or surfaced through
//! `CrewOutput::error`.

use thiserror::Error;

use crate::llms::base_llm::LLMError;
use crate::tools::base_tool::ToolError;

/// Errors produced while validating or executing a crew.
#[derive(Debug, Error)]
pub enum CrewError {
    /// The roster contains no agent whose role is `supervisor`.
    #[error("No supervisor agent found in crew")]
    NoSupervisor,

    /// The roster contains no agents at all.
    #[error("Crew has no agents")]
    EmptyCrew,

    /// More than one agent is marked as supervisor.
    #[error("Crew has more than one supervisor: {names}")]
    MultipleSupervisors { names: String },

    /// Two agents share a name, which would make routing ambiguous.
    #[error("Duplicate agent name in crew: {name}")]
    DuplicateAgent { name: String },

    /// A crew definition could not be read or parsed.
    #[error("Invalid crew definition: {message}")]
    InvalidDefinition { message: String },

    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Tool provider discovery or protocol failure.
    #[error("MCP error: {message}")]
    Mcp { message: String },

    /// The run exceeded its wall-clock budget.
    #[error("Run timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// A node task panicked or was cancelled.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CrewError {
    /// Whether this error is a roster/definition problem detected before any
    /// node runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CrewError::NoSupervisor
                | CrewError::EmptyCrew
                | CrewError::MultipleSupervisors { .. }
                | CrewError::DuplicateAgent { .. }
                | CrewError::InvalidDefinition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(CrewError::NoSupervisor.is_configuration());
        assert!(CrewError::DuplicateAgent { name: "a".into() }.is_configuration());
        assert!(!CrewError::Timeout { seconds: 3 }.is_configuration());
        assert!(!CrewError::Internal { message: "boom".into() }.is_configuration());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            CrewError::NoSupervisor.to_string(),
            "No supervisor agent found in crew"
        );
        assert_eq!(
            CrewError::Timeout { seconds: 300 }.to_string(),
            "Run timed out after 300s"
        );
    }
}
