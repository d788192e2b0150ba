//! Retry and timeout shield around any tool.
//!
//! A [`ResilientTool`] never fails: every attempt gets its own timeout,
//! failures are retried after a fixed delay, and once attempts are exhausted
//! the failure is returned as an ordinary result string the model can read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::base_tool::{BaseTool, ToolError};

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Uniform retry policy applied to every tool of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Budget of a single attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Wraps a tool with per-attempt timeouts and fixed-delay retries.
///
/// Name, description and schema are the inner tool's.
#[derive(Debug, Clone)]
pub struct ResilientTool {
    inner: Arc<dyn BaseTool>,
    policy: RetryPolicy,
}

impl ResilientTool {
    pub fn new(inner: Arc<dyn BaseTool>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, args: Value) -> Result<String, ToolError> {
        let budget = Duration::from_secs(self.policy.timeout_secs);
        match tokio::time::timeout(budget, self.inner.invoke(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                seconds: self.policy.timeout_secs,
            }),
        }
    }
}

#[async_trait]
impl BaseTool for ResilientTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn args_schema(&self) -> Value {
        self.inner.args_schema()
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let attempts = self.policy.attempts();
        let delay = Duration::from_millis(self.policy.retry_delay_ms);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.attempt(args.clone()).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    log::warn!(
                        "Tool '{}' {} error on attempt {}/{}: {}",
                        self.name(),
                        e.kind(),
                        attempt,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        log::error!(
            "Tool '{}' failed after {} attempts: {}",
            self.name(),
            attempts,
            reason
        );
        Ok(format!(
            "Error: tool '{}' failed after {} attempts: {}",
            self.name(),
            attempts,
            reason
        ))
    }
}
