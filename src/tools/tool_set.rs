//! Flat, run-scoped registry of every tool the workers can call.
//!
//! Providers are merged in registration order. When two providers expose
//! the same tool name the [`CollisionPolicy`] decides what happens to the
//! later one.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::config::MCPServerHTTP;
use crate::mcp::client::MCP_CONNECTION_TIMEOUT;
use crate::tools::base_tool::BaseTool;
use crate::tools::mcp_tool_wrapper::load_provider_tools;
use crate::tools::resilient_tool::{ResilientTool, RetryPolicy};
use crate::utilities::string_utils::sanitize_tool_name;

/// Provider label for tools registered directly rather than discovered.
pub const LOCAL_PROVIDER: &str = "local";

/// What to do with a tool whose name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Register the later tool as `{provider}_{tool}`.
    #[default]
    Namespace,
    /// Drop the later tool.
    Reject,
}

fn default_connect_timeout() -> u64 {
    MCP_CONNECTION_TIMEOUT
}

/// Tool layer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    /// Handshake budget per provider, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            collision_policy: CollisionPolicy::default(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ToolConfig {
    /// Defaults overridden by `CREW_TOOL_MAX_RETRIES`, `CREW_TOOL_RETRY_DELAY_MS`
    /// and `CREW_TOOL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("CREW_TOOL_MAX_RETRIES") {
            config.retry.max_retries = v as u32;
        }
        if let Some(v) = env_parse("CREW_TOOL_RETRY_DELAY_MS") {
            config.retry.retry_delay_ms = v;
        }
        if let Some(v) = env_parse("CREW_TOOL_TIMEOUT_SECS").filter(|v| *v > 0) {
            config.retry.timeout_secs = v;
        }
        config
    }
}

fn env_parse(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// A registered tool under the name the models see.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub name: String,
    pub provider: String,
    pub tool: Arc<dyn BaseTool>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    entries: Vec<ToolEntry>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover tools from every provider concurrently and merge them in
    /// registration order. A provider that cannot be reached contributes
    /// nothing.
    pub async fn discover(providers: &[MCPServerHTTP], config: &ToolConfig) -> Self {
        let loads = providers
            .iter()
            .map(|p| load_provider_tools(p, config.connect_timeout_secs));
        let results = join_all(loads).await;

        let mut set = Self::new();
        for (provider, result) in providers.iter().zip(results) {
            match result {
                Ok(tools) => {
                    log::info!(
                        "Loaded {} tools from provider '{}'",
                        tools.len(),
                        provider.name
                    );
                    let tools = tools
                        .into_iter()
                        .map(|t| Arc::new(t) as Arc<dyn BaseTool>)
                        .collect();
                    set.add_provider(&provider.name, tools, config);
                }
                Err(e) => log::warn!(
                    "Tool discovery failed for provider '{}' ({}): {:#}",
                    provider.name,
                    provider.url,
                    e
                ),
            }
        }
        set
    }

    /// Shield `tools` with the retry policy and merge them under `provider`.
    pub fn add_provider(
        &mut self,
        provider: &str,
        tools: Vec<Arc<dyn BaseTool>>,
        config: &ToolConfig,
    ) {
        for tool in tools {
            let shielded: Arc<dyn BaseTool> =
                Arc::new(ResilientTool::new(tool, config.retry.clone()));
            self.insert(provider, shielded, config.collision_policy);
        }
    }

    /// Register a tool as-is. Returns the name it was registered under, or
    /// `None` if it was rejected.
    pub fn insert(
        &mut self,
        provider: &str,
        tool: Arc<dyn BaseTool>,
        policy: CollisionPolicy,
    ) -> Option<String> {
        let original = tool.name().to_string();
        if !self.contains(&original) {
            self.entries.push(ToolEntry {
                name: original.clone(),
                provider: provider.to_string(),
                tool,
            });
            return Some(original);
        }

        match policy {
            CollisionPolicy::Reject => {
                log::warn!(
                    "Tool '{}' from provider '{}' rejected: name already registered",
                    original,
                    provider
                );
                None
            }
            CollisionPolicy::Namespace => {
                let base = sanitize_tool_name(&format!("{provider}_{original}"));
                let mut name = base.clone();
                let mut suffix = 2;
                while self.contains(&name) {
                    name = format!("{base}_{suffix}");
                    suffix += 1;
                }
                log::warn!(
                    "Tool '{}' from provider '{}' registered as '{}' to avoid a name collision",
                    original,
                    provider,
                    name
                );
                self.entries.push(ToolEntry {
                    name: name.clone(),
                    provider: provider.to_string(),
                    tool,
                });
                Some(name)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BaseTool>> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.tool)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn entries(&self) -> &[ToolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// OpenAI function specs under the registered names.
    pub fn function_specs(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|e| {
                json!({
                    "type": "function",
                    "function": {
                        "name": e.name,
                        "description": e.tool.description(),
                        "parameters": e.tool.args_schema(),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::base_tool::Tool;

    fn tool(name: &str, answer: &'static str) -> Arc<dyn BaseTool> {
        Arc::new(Tool::new(name, format!("{name} tool"), move |_| Ok(answer.to_string())))
    }

    #[tokio::test]
    async fn test_namespace_policy_renames_later_duplicate() {
        let mut set = ToolSet::new();
        assert_eq!(
            set.insert("docs", tool("search", "docs"), CollisionPolicy::Namespace),
            Some("search".to_string())
        );
        assert_eq!(
            set.insert("web", tool("search", "web"), CollisionPolicy::Namespace),
            Some("web_search".to_string())
        );

        assert_eq!(set.names(), vec!["search", "web_search"]);
        assert_eq!(set.get("search").unwrap().invoke(Value::Null).await.unwrap(), "docs");
        assert_eq!(set.get("web_search").unwrap().invoke(Value::Null).await.unwrap(), "web");
        assert_eq!(set.entries()[1].provider, "web");
    }

    #[test]
    fn test_namespace_policy_avoids_second_collision() {
        let mut set = ToolSet::new();
        set.insert("a", tool("search", ""), CollisionPolicy::Namespace);
        set.insert("b", tool("b_search", ""), CollisionPolicy::Namespace);
        assert_eq!(
            set.insert("b", tool("search", ""), CollisionPolicy::Namespace),
            Some("b_search_2".to_string())
        );
    }

    #[test]
    fn test_reject_policy_drops_duplicate() {
        let mut set = ToolSet::new();
        set.insert("docs", tool("search", "docs"), CollisionPolicy::Reject);
        assert_eq!(set.insert("web", tool("search", "web"), CollisionPolicy::Reject), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_function_specs_use_registered_names() {
        let mut set = ToolSet::new();
        set.add_provider(LOCAL_PROVIDER, vec![tool("clock", "")], &ToolConfig::default());
        set.add_provider("remote", vec![tool("clock", "")], &ToolConfig::default());
        let specs = set.function_specs();
        assert_eq!(specs[0]["function"]["name"], "clock");
        assert_eq!(specs[1]["function"]["name"], "remote_clock");
        assert_eq!(specs[1]["function"]["description"], "clock tool");
    }

    #[tokio::test]
    async fn test_discover_skips_unreachable_provider() {
        let providers = vec![MCPServerHTTP::new("down", "http://127.0.0.1:9/mcp")];
        let config = ToolConfig {
            connect_timeout_secs: 2,
            ..Default::default()
        };
        let set = ToolSet::discover(&providers, &config).await;
        assert!(set.is_empty());
    }

    #[test]
    fn test_tool_config_deserialize() {
        let config: ToolConfig =
            serde_yaml::from_str("collision_policy: reject\nretry:\n  max_retries: 0\n").unwrap();
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, MCP_CONNECTION_TIMEOUT);
    }
}
