//! Tool layer.
//!
//! [`BaseTool`] is the common interface; [`ResilientTool`] shields any tool
//! with retries and timeouts; [`ToolSet`] is the flat registry handed to the
//! graph for one run.

pub mod base_tool;
pub mod mcp_tool_wrapper;
pub mod resilient_tool;
pub mod tool_calling;
pub mod tool_set;

pub use base_tool::{BaseTool, Tool, ToolError};
pub use mcp_tool_wrapper::MCPToolWrapper;
pub use resilient_tool::{ResilientTool, RetryPolicy};
pub use tool_set::{CollisionPolicy, ToolConfig, ToolSet};
