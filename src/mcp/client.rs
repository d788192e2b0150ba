//! MCP client: session handshake, tool discovery and tool invocation.
//!
//! Speaks JSON-RPC 2.0 over any [`BaseTransport`]. The client connects
//! lazily, so `list_tools` and `call_tool` can be used on a fresh instance.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::mcp::transports::BaseTransport;

/// MCP connection timeout in seconds.
pub const MCP_CONNECTION_TIMEOUT: u64 = 15;
/// MCP tool discovery timeout in seconds.
pub const MCP_DISCOVERY_TIMEOUT: u64 = 30;
/// Protocol revision requested during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

const METHOD_NOT_FOUND: i64 = -32601;

/// Protocol-level failures reported by the client.
#[derive(Debug, Error)]
pub enum MCPError {
    #[error("MCP server error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("MCP {operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    #[error("MCP server sent no response to {method}")]
    NoResponse { method: String },

    /// The tool ran and reported failure (`isError: true`).
    #[error("{0}")]
    ToolFailed(String),
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MCPToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// MCP client with session management.
pub struct MCPClient {
    pub transport: Box<dyn BaseTransport>,
    /// Connection (handshake) timeout in seconds.
    pub connect_timeout: u64,
    /// Tool discovery timeout in seconds.
    pub discovery_timeout: u64,
    initialized: bool,
    server_info: Option<Value>,
    next_id: u64,
}

impl MCPClient {
    pub fn new(transport: Box<dyn BaseTransport>) -> Self {
        Self {
            transport,
            connect_timeout: MCP_CONNECTION_TIMEOUT,
            discovery_timeout: MCP_DISCOVERY_TIMEOUT,
            initialized: false,
            server_info: None,
            next_id: 1,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: u64) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: u64) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// `true` once the transport is up and the handshake has completed.
    pub fn connected(&self) -> bool {
        self.transport.connected() && self.initialized
    }

    /// `serverInfo` reported during `initialize`.
    pub fn server_info(&self) -> Option<&Value> {
        self.server_info.as_ref()
    }

    /// Connect and run the `initialize` handshake.
    pub async fn connect(&mut self) -> Result<(), anyhow::Error> {
        if self.connected() {
            return Ok(());
        }

        let server = self.transport.server_identifier();
        let started_at = Instant::now();
        log::info!(
            "MCP connection started: server='{}', transport='{}'",
            server,
            self.transport.transport_type()
        );

        let timeout = Duration::from_secs(self.connect_timeout);
        match tokio::time::timeout(timeout, self.handshake()).await {
            Ok(Ok(())) => {
                self.initialized = true;
                log::info!(
                    "MCP connection established: server='{}' ({}ms)",
                    server,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.cleanup_on_error().await;
                log::warn!("MCP connection to '{}' failed: {}", server, e);
                Err(e.context(format!("Failed to connect to MCP server {server}")))
            }
            Err(_) => {
                self.cleanup_on_error().await;
                log::warn!(
                    "MCP connection to '{}' timed out after {}s",
                    server,
                    self.connect_timeout
                );
                Err(MCPError::Timeout {
                    operation: "connection".into(),
                    seconds: self.connect_timeout,
                }
                .into())
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), anyhow::Error> {
        self.transport.connect().await?;
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        self.server_info = result.get("serverInfo").cloned();
        self.notify("notifications/initialized").await
    }

    pub async fn disconnect(&mut self) -> Result<(), anyhow::Error> {
        if !self.connected() {
            return Ok(());
        }
        self.initialized = false;
        self.server_info = None;
        self.transport
            .disconnect()
            .await
            .map_err(|e| e.context("Error during MCP client disconnect"))
    }

    async fn cleanup_on_error(&mut self) {
        self.initialized = false;
        if let Err(e) = self.transport.disconnect().await {
            log::debug!("MCP cleanup after failed connect: {}", e);
        }
    }

    /// List every tool the server offers, following pagination cursors.
    ///
    /// A server without the tools capability (`-32601`) yields an empty list.
    pub async fn list_tools(&mut self) -> Result<Vec<MCPToolDefinition>, anyhow::Error> {
        self.connect().await?;

        let timeout = Duration::from_secs(self.discovery_timeout);
        match tokio::time::timeout(timeout, self.list_tools_impl()).await {
            Ok(result) => result,
            Err(_) => Err(MCPError::Timeout {
                operation: "tool discovery".into(),
                seconds: self.discovery_timeout,
            }
            .into()),
        }
    }

    async fn list_tools_impl(&mut self) -> Result<Vec<MCPToolDefinition>, anyhow::Error> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let result = match self.request("tools/list", params).await {
                Ok(result) => result,
                Err(e) => match e.downcast_ref::<MCPError>() {
                    Some(MCPError::JsonRpc { code, .. }) if *code == METHOD_NOT_FOUND => {
                        log::info!(
                            "MCP server '{}' does not support tools/list",
                            self.transport.server_identifier()
                        );
                        return Ok(Vec::new());
                    }
                    _ => return Err(e),
                },
            };

            if let Some(page) = result.get("tools").and_then(Value::as_array) {
                for raw in page {
                    match serde_json::from_value::<MCPToolDefinition>(raw.clone()) {
                        Ok(tool) => tools.push(tool),
                        Err(e) => log::warn!("Skipping malformed MCP tool definition: {}", e),
                    }
                }
            }

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        log::debug!(
            "Discovered {} tools from '{}'",
            tools.len(),
            self.transport.server_identifier()
        );
        Ok(tools)
    }

    /// Invoke a tool and return its text output.
    ///
    /// A result flagged `isError` is returned as [`MCPError::ToolFailed`].
    pub async fn call_tool(
        &mut self,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<String, anyhow::Error> {
        self.connect().await?;

        let arguments = match arguments {
            Value::Object(map) => Value::Object(Self::clean_tool_arguments(map)),
            _ => Value::Object(Map::new()),
        };
        let result = self
            .request("tools/call", json!({"name": tool_name, "arguments": arguments}))
            .await?;

        let text = extract_text_content(&result);
        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(MCPError::ToolFailed(text).into());
        }
        Ok(text)
    }

    /// Drop null values recursively, then drop containers left empty.
    pub fn clean_tool_arguments(arguments: &Map<String, Value>) -> Map<String, Value> {
        let mut cleaned = Map::new();
        for (key, value) in arguments {
            if let Some(v) = clean_value(value) {
                cleaned.insert(key.clone(), v);
            }
        }
        cleaned
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, anyhow::Error> {
        let id = self.next_id;
        self.next_id += 1;

        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let response = self.transport.send(&message).await?.ok_or_else(|| MCPError::NoResponse {
            method: method.to_string(),
        })?;

        if let Some(error) = response.get("error") {
            return Err(MCPError::JsonRpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }
            .into());
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn notify(&mut self, method: &str) -> Result<(), anyhow::Error> {
        let message = json!({"jsonrpc": "2.0", "method": method});
        self.transport.send(&message).await.map(|_| ())
    }
}

fn clean_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned = MCPClient::clean_tool_arguments(map);
            (!cleaned.is_empty()).then(|| Value::Object(cleaned))
        }
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.iter().filter_map(clean_value).collect();
            (!cleaned.is_empty()).then(|| Value::Array(cleaned))
        }
        other => Some(other.clone()),
    }
}

/// Concatenate the text items of a `tools/call` result.
///
/// Non-text items are rendered as JSON; `structuredContent` is used when
/// the server sends no content items at all.
fn extract_text_content(result: &Value) -> String {
    let parts: Vec<String> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item.get("text").and_then(Value::as_str) {
                    Some(text) if item.get("type").and_then(Value::as_str) == Some("text") => {
                        text.to_string()
                    }
                    _ => item.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        if let Some(structured) = result.get("structuredContent") {
            return structured.to_string();
        }
    }
    parts.join("\n")
}
