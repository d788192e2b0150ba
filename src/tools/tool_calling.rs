//! Executing the tool calls a model requested.

use crate::tools::tool_set::ToolSet;
use crate::types::message::{Message, ToolCall};

/// Run one call against the set and wrap its output as a tool message.
///
/// Unknown tools and tool errors become error strings in the result; this
/// never fails.
pub async fn execute_tool_call(tools: &ToolSet, call: &ToolCall) -> Message {
    let content = match tools.get(&call.name) {
        Some(tool) => match tool.invoke(call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Tool '{}' failed: {}", call.name, e);
                format!("Error: tool '{}' failed: {}", call.name, e)
            }
        },
        None => {
            log::warn!("Model requested unknown tool '{}'", call.name);
            let available = tools.names();
            if available.is_empty() {
                format!("Error: tool '{}' is not available. No tools are available.", call.name)
            } else {
                format!(
                    "Error: tool '{}' is not available. Available tools: {}",
                    call.name,
                    available.join(", ")
                )
            }
        }
    };
    Message::tool_result(&call.id, &call.name, content)
}

/// Run calls in the order the model listed them.
pub async fn execute_tool_calls(tools: &ToolSet, calls: &[ToolCall]) -> Vec<Message> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(execute_tool_call(tools, call).await);
    }
    results
}
