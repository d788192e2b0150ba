//! Run-scoped side channel for visit counters.
//!
//! Every node execution reconciles its incoming state against the
//! [`VisitLedger`] before it runs and records its counters afterwards, so a
//! counter dropped on the way between two nodes is restored instead of
//! silently restarting at zero. One [`RunContext`] exists per run; nothing
//! here is shared between runs.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::types::message::Message;
use crate::types::state::ConversationState;

#[derive(Debug, Default)]
pub struct VisitLedger {
    supervisor: AtomicU32,
    agents: DashMap<String, u32>,
    total_messages: AtomicUsize,
}

impl VisitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise every counter in `state` to at least the recorded value.
    pub fn reconcile(&self, state: &mut ConversationState) {
        state.supervisor_visits = state
            .supervisor_visits
            .max(self.supervisor.load(Ordering::SeqCst));
        state.total_messages = state
            .total_messages
            .max(self.total_messages.load(Ordering::SeqCst));
        for entry in self.agents.iter() {
            let visits = state.agent_visits.entry(entry.key().clone()).or_insert(0);
            *visits = (*visits).max(*entry.value());
        }
    }

    /// Store the counters of `state`. Recorded values never decrease.
    pub fn record(&self, state: &ConversationState) {
        self.supervisor
            .fetch_max(state.supervisor_visits, Ordering::SeqCst);
        self.total_messages
            .fetch_max(state.total_messages, Ordering::SeqCst);
        for (agent, visits) in &state.agent_visits {
            let mut entry = self.agents.entry(agent.clone()).or_insert(0);
            *entry = (*entry).max(*visits);
        }
    }

    pub fn supervisor_visits(&self) -> u32 {
        self.supervisor.load(Ordering::SeqCst)
    }

    pub fn agent_visits(&self, agent: &str) -> u32 {
        self.agents.get(agent).map(|v| *v).unwrap_or(0)
    }
}

/// Everything a run owns besides the state that travels between nodes.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub ledger: VisitLedger,
    transcript: Mutex<Vec<Message>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4().to_string())
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ledger: VisitLedger::new(),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Append to the state window and to the run's full transcript.
    pub fn append(&self, state: &mut ConversationState, message: Message) {
        self.transcript.lock().push(message.clone());
        state.append(message);
    }

    /// Record a message that is already part of the state, such as the prompt.
    pub fn record_message(&self, message: Message) {
        self.transcript.lock().push(message);
    }

    /// Every message appended so far, never compacted.
    pub fn transcript(&self) -> Vec<Message> {
        self.transcript.lock().clone()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
