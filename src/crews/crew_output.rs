//! Crew output representation.
//!
//! The result of one run: the transcript, why it stopped early (if it did),
//! and the error that ended it (if any).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::message::Message;
use crate::utilities::errors::CrewError;

/// Result of executing a prompt against a crew.
///
/// A caller always gets one of these, even when the run failed: `error` is
/// then set and `messages` holds whatever was produced before the failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewOutput {
    /// Identifier of the run, for correlating logs.
    #[serde(default)]
    pub run_id: String,
    /// Full transcript, deduplicated.
    pub messages: Vec<Message>,
    /// Set when a limit or the supervisor ended the run early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exec_time_seconds: f64,
}

impl CrewOutput {
    /// Output of a run that failed before producing anything.
    pub fn from_error(error: &CrewError, exec_time_seconds: f64) -> Self {
        Self {
            error: Some(error.to_string()),
            exec_time_seconds,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Content of the last assistant message.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant { .. }) && !m.content().trim().is_empty())
            .map(|m| m.content())
    }
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.final_answer()) {
            (Some(error), _) => write!(f, "error: {}", error),
            (None, Some(answer)) => write!(f, "{}", answer),
            (None, None) => Ok(()),
        }
    }
}
