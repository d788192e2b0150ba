//! Tool provider records.
//!
//! A crew lists the MCP servers its workers may use. Each record names the
//! provider (used for namespacing on name collisions), where to reach it, and
//! optionally which of its tools to expose.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Allow/block lists applied to a provider's advertised tools.
///
/// Blocked names take precedence. An empty allow list allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticToolFilter {
    #[serde(default)]
    pub allowed: HashSet<String>,
    #[serde(default)]
    pub blocked: HashSet<String>,
}

impl StaticToolFilter {
    pub fn allows(&self, tool_name: &str) -> bool {
        if self.blocked.contains(tool_name) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.contains(tool_name)
    }
}

/// A remote tool provider reachable over streamable HTTP.
#[derive(Clone, Serialize, Deserialize)]
pub struct MCPServerHTTP {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub streamable: bool,
    #[serde(default)]
    pub tool_filter: Option<StaticToolFilter>,
}

impl std::fmt::Debug for MCPServerHTTP {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MCPServerHTTP")
            .field("name", &self.name)
            .field("url", &self.url)
            .field(
                "headers",
                &self
                    .headers
                    .keys()
                    .map(|k| format!("{k}=<masked>"))
                    .collect::<Vec<_>>(),
            )
            .field("streamable", &self.streamable)
            .field("tool_filter", &self.tool_filter)
            .finish()
    }
}

impl MCPServerHTTP {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            headers: HashMap::new(),
            streamable: true,
            tool_filter: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_tool_filter(mut self, filter: StaticToolFilter) -> Self {
        self.tool_filter = Some(filter);
        self
    }

    /// Whether the provider's filter (if any) lets `tool_name` through.
    pub fn exposes(&self, tool_name: &str) -> bool {
        self.tool_filter
            .as_ref()
            .map_or(true, |f| f.allows(tool_name))
    }
}
