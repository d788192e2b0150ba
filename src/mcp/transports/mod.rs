//! Transport layer for MCP connections.
//!
//! A transport moves JSON-RPC messages to and from one server. The client
//! owns protocol semantics (ids, handshake, method names); transports only
//! deliver a message and hand back the matching response, if any.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HTTPTransport;

/// MCP transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Plain JSON request/response over HTTP.
    Http,
    /// Streamable HTTP: responses may arrive as an SSE stream.
    StreamableHttp,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Http => write!(f, "http"),
            TransportType::StreamableHttp => write!(f, "streamable-http"),
        }
    }
}

/// Failures delivering a message.
///
/// All variants are network-class: the server could not be reached or did
/// not answer with a usable payload.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MCP server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed MCP response: {0}")]
    Protocol(String),
}

/// Interface implemented by every MCP transport.
#[async_trait]
pub trait BaseTransport: Send + Sync {
    fn transport_type(&self) -> TransportType;

    fn connected(&self) -> bool;

    /// Prepare the transport. A no-op when already connected.
    async fn connect(&mut self) -> Result<(), anyhow::Error>;

    /// Release the connection. A no-op when not connected.
    async fn disconnect(&mut self) -> Result<(), anyhow::Error>;

    /// Deliver one JSON-RPC message.
    ///
    /// Returns the response for requests and `None` for notifications.
    async fn send(&mut self, message: &Value) -> Result<Option<Value>, anyhow::Error>;

    /// Identifier used in log lines, e.g. `"http:https://host/mcp"`.
    fn server_identifier(&self) -> String;
}
