//! Model Context Protocol integration.
//!
//! Tool providers are remote MCP servers reached over streamable HTTP. The
//! client discovers their tools once per run; the tool layer wraps each one as
//! a [`BaseTool`](crate::tools::base_tool::BaseTool).

pub mod client;
pub mod config;
pub mod transports;

pub use client::{MCPClient, MCPError, MCPToolDefinition};
pub use config::{MCPServerHTTP, StaticToolFilter};
pub use transports::{BaseTransport, HTTPTransport, TransportError, TransportType};
