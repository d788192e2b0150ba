//! Tool abstraction.
//!
//! A tool is a named callable with a description and a JSON argument schema.
//! Remote MCP tools, local closures and the retry shield all implement
//! [`BaseTool`], so the graph treats them uniformly.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use thiserror::Error;

/// Failure of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Timeout, refused connection or bad status from a remote provider.
    #[error("network error: {message}")]
    Network { message: String },

    /// The invocation did not finish within its time budget.
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Arguments did not fit the tool's schema.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The tool ran and failed.
    #[error("{message}")]
    Execution { message: String },
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::Execution {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ToolError::Network {
            message: message.into(),
        }
    }

    /// Network-class failures (timeouts included) as opposed to generic ones.
    pub fn is_network(&self) -> bool {
        matches!(self, ToolError::Network { .. } | ToolError::Timeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        if self.is_network() {
            "network"
        } else {
            "generic"
        }
    }
}

/// Interface shared by every tool.
#[async_trait]
pub trait BaseTool: Send + Sync + fmt::Debug {
    /// Unique name the model uses to call the tool.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn args_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError>;
}

/// OpenAI function spec for a tool.
pub fn function_spec(tool: &dyn BaseTool) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name(),
            "description": tool.description(),
            "parameters": tool.args_schema(),
        }
    })
}

pub type ToolFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// Tool backed by a closure.
#[derive(Clone)]
pub struct Tool {
    tool_name: String,
    tool_description: String,
    tool_args_schema: Value,
    pub func: ToolFn,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.tool_name)
            .field("description", &self.tool_description)
            .finish()
    }
}

impl Tool {
    /// Wrap a synchronous function.
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::from_fn(
            name,
            description,
            Arc::new(move |args| {
                let func = Arc::clone(&func);
                async move { func(args) }.boxed()
            }),
        )
    }

    /// Wrap an async function.
    pub fn new_async<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        func: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self::from_fn(name, description, Arc::new(move |args| func(args).boxed()))
    }

    fn from_fn(name: impl Into<String>, description: impl Into<String>, func: ToolFn) -> Self {
        Self {
            tool_name: name.into(),
            tool_description: description.into(),
            tool_args_schema: json!({"type": "object", "properties": {}}),
            func,
        }
    }

    pub fn with_args_schema(mut self, schema: Value) -> Self {
        self.tool_args_schema = schema;
        self
    }
}

#[async_trait]
impl BaseTool for Tool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.tool_description
    }

    fn args_schema(&self) -> Value {
        self.tool_args_schema.clone()
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        (self.func)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_tool_invoke() {
        let tool = Tool::new("echo", "Echo the input", |args| {
            Ok(args["text"].as_str().unwrap_or("").to_string())
        });
        assert_eq!(tool.invoke(json!({"text": "hi"})).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_async_tool_invoke() {
        let tool = Tool::new_async("later", "Answer later", |_args| async {
            tokio::task::yield_now().await;
            Err(ToolError::network("refused"))
        });
        let err = tool.invoke(json!({})).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(err.kind(), "network");
    }

    #[test]
    fn test_function_spec() {
        let tool = Tool::new("search", "Search the web", |_| Ok(String::new()))
            .with_args_schema(json!({"type": "object", "properties": {"q": {"type": "string"}}}));
        let spec = function_spec(&tool);
        assert_eq!(spec["function"]["name"], "search");
        assert_eq!(spec["function"]["parameters"]["properties"]["q"]["type"], "string");
    }

    #[test]
    fn test_error_kinds() {
        assert!(ToolError::Timeout { seconds: 1 }.is_network());
        assert!(!ToolError::execution("bad").is_network());
        assert_eq!(ToolError::execution("bad").to_string(), "bad");
    }
}
