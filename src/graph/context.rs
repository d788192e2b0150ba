//! Bounding what models re-read each cycle.

use std::fmt;

use crate::graph::config::GraphConfig;
use crate::types::message::Message;
use crate::types::state::ConversationState;

/// Shortens the message window before the supervisor runs.
///
/// Implementations only touch `messages` and `message_count`; the run's
/// transcript and counters are not theirs to change.
pub trait ContextStrategy: Send + Sync + fmt::Debug {
    fn compact(&self, state: ConversationState) -> ConversationState;
}

/// Keeps the original request and the most recent messages, replacing
/// everything in between with a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSummarizer {
    pub summarize_after: usize,
    pub keep_last: usize,
}

impl Default for WindowSummarizer {
    fn default() -> Self {
        Self {
            summarize_after: 5,
            keep_last: 3,
        }
    }
}

impl WindowSummarizer {
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            summarize_after: config.summarize_after,
            keep_last: config.keep_last,
        }
    }
}

pub fn summary_placeholder(omitted: usize) -> String {
    format!("[Summary of {omitted} earlier messages omitted to bound context]")
}

impl ContextStrategy for WindowSummarizer {
    fn compact(&self, mut state: ConversationState) -> ConversationState {
        let len = state.messages.len();
        if len > self.summarize_after && len > self.keep_last + 1 {
            let tail_start = len - self.keep_last;
            let omitted = tail_start - 1;
            let tail = state.messages.split_off(tail_start);
            state.messages.truncate(1);
            state.messages.push(Message::system(summary_placeholder(omitted)));
            state.messages.extend(tail);
            log::debug!(
                "[{}] compacted context: {} -> {} messages",
                state.run_id,
                len,
                state.messages.len()
            );
        }
        state.message_count = state.messages.len();
        state
    }
}
