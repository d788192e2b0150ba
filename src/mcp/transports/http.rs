//! Streamable HTTP transport for MCP servers.
//!
//! Every JSON-RPC message is a `POST` to the server URL. The server answers
//! with either a JSON body or an SSE stream carrying the response; a session
//! id handed out during `initialize` is echoed on every later request.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::mcp::transports::{BaseTransport, TransportError, TransportType};

const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP/Streamable HTTP transport for connecting to remote MCP servers.
pub struct HTTPTransport {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub streamable: bool,
    client: reqwest::Client,
    session_id: Option<String>,
    is_connected: bool,
}

impl HTTPTransport {
    pub fn new(
        url: &str,
        headers: Option<HashMap<String, String>>,
        streamable: Option<bool>,
    ) -> Self {
        Self {
            url: url.to_string(),
            headers: headers.unwrap_or_default(),
            streamable: streamable.unwrap_or(true),
            client: reqwest::Client::new(),
            session_id: None,
            is_connected: false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, &self.url);
        for (k, v) in &self.headers {
            request = request.header(k, v);
        }
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }
        request
    }
}

/// Find the JSON-RPC response to `id` in an SSE body.
///
/// Events are separated by blank lines; multi-line `data:` fields are joined
/// with newlines. Server-initiated requests and notifications on the stream
/// are skipped.
pub fn parse_sse_response(body: &str, id: Option<&Value>) -> Option<Value> {
    let mut fallback = None;

    for event in body.replace("\r\n", "\n").split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect();
        if data.is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&data.join("\n")) else {
            continue;
        };
        let is_response = message.get("result").is_some() || message.get("error").is_some();
        if !is_response {
            continue;
        }
        if id.is_none() || message.get("id") == id {
            return Some(message);
        }
        fallback.get_or_insert(message);
    }

    fallback
}

#[async_trait]
impl BaseTransport for HTTPTransport {
    fn transport_type(&self) -> TransportType {
        if self.streamable {
            TransportType::StreamableHttp
        } else {
            TransportType::Http
        }
    }

    fn connected(&self) -> bool {
        self.is_connected
    }

    async fn connect(&mut self) -> Result<(), anyhow::Error> {
        if self.is_connected {
            return Ok(());
        }
        log::debug!(
            "HTTP transport connecting to: {} (streamable={})",
            self.url,
            self.streamable
        );
        self.is_connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), anyhow::Error> {
        if !self.is_connected {
            return Ok(());
        }
        if self.session_id.is_some() {
            // Session termination is best effort; servers may not support DELETE.
            if let Err(e) = self.request(reqwest::Method::DELETE).send().await {
                log::debug!("MCP session termination for {} failed: {}", self.url, e);
            }
        }
        self.session_id = None;
        self.is_connected = false;
        Ok(())
    }

    async fn send(&mut self, message: &Value) -> Result<Option<Value>, anyhow::Error> {
        let response = self
            .request(reqwest::Method::POST)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message)
            .send()
            .await
            .map_err(TransportError::from)?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session.to_string());
        }

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(TransportError::from)?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            }
            .into());
        }

        let id = message.get("id");
        if id.is_none() || body.trim().is_empty() {
            return Ok(None);
        }

        if content_type.contains("text/event-stream") {
            return parse_sse_response(&body, id)
                .map(Some)
                .ok_or_else(|| TransportError::Protocol("no response in event stream".into()).into());
        }

        let parsed = serde_json::from_str::<Value>(&body)
            .map_err(|e| TransportError::Protocol(format!("invalid JSON body: {e}")))?;
        Ok(Some(parsed))
    }

    fn server_identifier(&self) -> String {
        format!("http:{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sse_response_matches_id() {
        let body = "event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\r\n\r\n\
                    event: message\r\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\r\n\r\n";
        let parsed = parse_sse_response(body, Some(&json!(2))).unwrap();
        assert_eq!(parsed["result"], json!({"tools": []}));
    }

    #[test]
    fn test_parse_sse_response_multiline_data() {
        let body = "data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":1,\"result\":{}}\n\n";
        let parsed = parse_sse_response(body, Some(&json!(1))).unwrap();
        assert_eq!(parsed["id"], 1);
    }

    #[test]
    fn test_parse_sse_response_none() {
        assert!(parse_sse_response(": keepalive\n\n", Some(&json!(1))).is_none());
    }

    #[test]
    fn test_headers_are_kept() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let transport = HTTPTransport::new("http://localhost/mcp", Some(headers), None);
        assert_eq!(transport.headers.len(), 1);
        assert!(transport.session_id().is_none());
    }
}
