//! Model client configuration and construction.
//!
//! [`LLMConfig`] carries the gateway connection settings shared by every agent
//! of a crew; [`LLMConfig::build`] produces the client for one agent, applying
//! its per-agent model override.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llms::base_llm::BaseLLM;
use crate::llms::providers::openai::{OpenAICompletion, DEFAULT_BASE_URL};

pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> f64 {
    120.0
}

fn default_max_retries() -> u32 {
    2
}

/// Connection settings for the chat completions gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used by agents without a `model_override`.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: None,
            max_retries: default_max_retries(),
        }
    }
}

impl LLMConfig {
    /// Read settings from the environment.
    ///
    /// `OPENROUTER_API_KEY` (falling back to `OPENAI_API_KEY`),
    /// `CREW_LLM_BASE_URL`, `CREW_DEFAULT_MODEL`, `CREW_LLM_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = std::env::var("OPENROUTER_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Ok(url) = std::env::var("CREW_LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("CREW_DEFAULT_MODEL") {
            if !model.trim().is_empty() {
                config.default_model = model;
            }
        }
        if let Some(secs) = std::env::var("CREW_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| *v > 0.0)
        {
            config.timeout_secs = secs;
        }
        config
    }

    /// Model id for an agent: its override if set, else the default.
    pub fn resolve_model(&self, model_override: Option<&str>) -> String {
        model_override
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    /// Build a client for an agent.
    pub fn build(&self, model_override: Option<&str>) -> Arc<dyn BaseLLM> {
        let model = self.resolve_model(model_override);
        log::debug!("Creating LLM client for model {}", model);
        Arc::new(
            OpenAICompletion::new(model, self.api_key.clone(), Some(self.base_url.clone()))
                .with_timeout(self.timeout_secs)
                .with_temperature(self.temperature)
                .with_max_retries(self.max_retries),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model() {
        let config = LLMConfig::default();
        assert_eq!(config.resolve_model(None), DEFAULT_MODEL);
        assert_eq!(config.resolve_model(Some("  ")), DEFAULT_MODEL);
        assert_eq!(config.resolve_model(Some("openai/gpt-4o")), "openai/gpt-4o");
    }

    #[test]
    fn test_build_applies_override() {
        let config = LLMConfig::default();
        let llm = config.build(Some("openai/gpt-4o-mini"));
        assert_eq!(llm.model(), "openai/gpt-4o-mini");
        assert_eq!(llm.provider(), "openai");
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = LLMConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: LLMConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, 2);
    }
}
