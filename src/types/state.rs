//! Shared conversation state threaded through the orchestration graph.

use std::collections::HashMap;

use serde::Serialize;

use crate::graph::node::Route;
use crate::types::message::Message;

/// State handed from node to node during a run.
///
/// `messages` is the window models re-read and may be shortened by the
/// context manager. `total_messages` only ever grows and is what the message
/// cap is measured against.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    pub run_id: String,
    pub messages: Vec<Message>,
    /// Supervisor's last decision. `None` means no valid decision was made.
    pub next: Option<Route>,
    /// Length of `messages` as of the last context-manager pass.
    pub message_count: usize,
    pub supervisor_visits: u32,
    pub agent_visits: HashMap<String, u32>,
    pub termination_reason: Option<String>,
    pub total_messages: usize,
}

impl ConversationState {
    /// Initial state for a run: the prompt as the single user message.
    pub fn new(run_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let mut state = Self {
            run_id: run_id.into(),
            ..Default::default()
        };
        state.append(Message::user(prompt));
        state.message_count = state.messages.len();
        state
    }

    /// Append a message to the window and bump the run-wide counter.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.total_messages += 1;
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn visits_for(&self, agent: &str) -> u32 {
        self.agent_visits.get(agent).copied().unwrap_or(0)
    }

    /// Whether any worker has run so far.
    pub fn any_worker_visited(&self) -> bool {
        self.agent_visits.values().any(|v| *v > 0)
    }

    /// The first user message, i.e. the original request.
    pub fn original_request(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| m.content())
    }
}
