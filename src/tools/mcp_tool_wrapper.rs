//! A tool discovered on an MCP server, exposed as a [`BaseTool`].
//!
//! All tools of one provider share a single client (and so a single session).
//! Calls are serialized through that client.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::mcp::client::{MCPClient, MCPError, MCPToolDefinition};
use crate::mcp::config::MCPServerHTTP;
use crate::mcp::transports::{BaseTransport, HTTPTransport, TransportError};
use crate::tools::base_tool::{BaseTool, ToolError};

/// Remote tool on an MCP server.
#[derive(Clone)]
pub struct MCPToolWrapper {
    pub name: String,
    pub description: String,
    pub args_schema: Value,
    pub server_name: String,
    client: Arc<Mutex<MCPClient>>,
}

impl fmt::Debug for MCPToolWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MCPToolWrapper")
            .field("name", &self.name)
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl MCPToolWrapper {
    pub fn new(
        definition: MCPToolDefinition,
        server_name: impl Into<String>,
        client: Arc<Mutex<MCPClient>>,
    ) -> Self {
        let server_name = server_name.into();
        let description = definition
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Tool {} from {}", definition.name, server_name));

        Self {
            name: definition.name,
            description,
            args_schema: definition.input_schema,
            server_name,
            client,
        }
    }
}

/// Map a client failure onto the tool error taxonomy.
pub fn classify_mcp_error(error: &anyhow::Error) -> ToolError {
    if error.downcast_ref::<TransportError>().is_some() {
        return ToolError::network(error.to_string());
    }
    match error.downcast_ref::<MCPError>() {
        Some(MCPError::Timeout { seconds, .. }) => ToolError::Timeout { seconds: *seconds },
        Some(MCPError::ToolFailed(message)) => ToolError::execution(message.clone()),
        Some(MCPError::JsonRpc { code: -32602, message }) => ToolError::InvalidArguments {
            message: message.clone(),
        },
        _ => ToolError::execution(error.to_string()),
    }
}

#[async_trait]
impl BaseTool for MCPToolWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        self.args_schema.clone()
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        log::debug!("Calling MCP tool '{}' on '{}'", self.name, self.server_name);
        let mut client = self.client.lock().await;
        client
            .call_tool(&self.name, &args)
            .await
            .map_err(|e| classify_mcp_error(&e))
    }
}

/// Connect to a provider and wrap every tool its filter exposes.
pub async fn load_provider_tools(
    server: &MCPServerHTTP,
    connect_timeout: u64,
) -> Result<Vec<MCPToolWrapper>, anyhow::Error> {
    let transport = HTTPTransport::new(
        &server.url,
        Some(server.headers.clone()),
        Some(server.streamable),
    );
    load_tools_over(Box::new(transport), server, connect_timeout).await
}

pub(crate) async fn load_tools_over(
    transport: Box<dyn BaseTransport>,
    server: &MCPServerHTTP,
    connect_timeout: u64,
) -> Result<Vec<MCPToolWrapper>, anyhow::Error> {
    let mut client = MCPClient::new(transport).with_connect_timeout(connect_timeout);
    let definitions = client.list_tools().await?;
    let client = Arc::new(Mutex::new(client));

    Ok(definitions
        .into_iter()
        .filter(|d| server.exposes(&d.name))
        .map(|d| MCPToolWrapper::new(d, server.name.clone(), Arc::clone(&client)))
        .collect())
}
