//! Limits and timeouts of one orchestration run.

use serde::{Deserialize, Serialize};

fn default_max_supervisor_visits() -> u32 {
    5
}

fn default_max_agent_visits() -> u32 {
    3
}

fn default_max_messages() -> usize {
    12
}

fn default_max_steps() -> usize {
    50
}

fn default_completion_markers() -> Vec<String> {
    vec!["FINAL ANSWER".to_string(), "TASK COMPLETE".to_string()]
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_summarize_after() -> usize {
    5
}

fn default_keep_last() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// The supervisor stops once its visit count exceeds this.
    #[serde(default = "default_max_supervisor_visits")]
    pub max_supervisor_visits: u32,
    /// A worker ends the run on the visit that reaches this.
    #[serde(default = "default_max_agent_visits")]
    pub max_agent_visits: u32,
    /// The supervisor stops once more messages than this were appended.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Node executions allowed per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Case-insensitive phrases that mark a supervisor message as final.
    #[serde(default = "default_completion_markers")]
    pub completion_markers: Vec<String>,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Window length above which the context manager compacts.
    #[serde(default = "default_summarize_after")]
    pub summarize_after: usize,
    /// Messages kept verbatim at the end of a compacted window.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_supervisor_visits: default_max_supervisor_visits(),
            max_agent_visits: default_max_agent_visits(),
            max_messages: default_max_messages(),
            max_steps: default_max_steps(),
            completion_markers: default_completion_markers(),
            run_timeout_secs: default_run_timeout_secs(),
            summarize_after: default_summarize_after(),
            keep_last: default_keep_last(),
        }
    }
}

impl GraphConfig {
    /// Defaults overridden by `CREW_MAX_SUPERVISOR_VISITS`,
    /// `CREW_MAX_AGENT_VISITS`, `CREW_MAX_MESSAGES`, `CREW_MAX_STEPS` and
    /// `CREW_RUN_TIMEOUT_SECS`. Zero and unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_positive("CREW_MAX_SUPERVISOR_VISITS") {
            config.max_supervisor_visits = v as u32;
        }
        if let Some(v) = env_positive("CREW_MAX_AGENT_VISITS") {
            config.max_agent_visits = v as u32;
        }
        if let Some(v) = env_positive("CREW_MAX_MESSAGES") {
            config.max_messages = v as usize;
        }
        if let Some(v) = env_positive("CREW_MAX_STEPS") {
            config.max_steps = v as usize;
        }
        if let Some(v) = env_positive("CREW_RUN_TIMEOUT_SECS") {
            config.run_timeout_secs = v;
        }
        config
    }
}

fn env_positive(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}
