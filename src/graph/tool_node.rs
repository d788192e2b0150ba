//! The tool node: runs the calls of the worker message that routed here.

use crate::tools::tool_calling::execute_tool_calls;
use crate::tools::tool_set::ToolSet;
use crate::types::message::Message;
use crate::types::state::ConversationState;

/// Execute the tool calls on the last message, returning one result per
/// call in request order.
pub async fn run_tools(tools: &ToolSet, state: &ConversationState) -> Vec<Message> {
    let Some(last) = state.last_message() else {
        return Vec::new();
    };
    let calls = last.tool_calls();
    if calls.is_empty() {
        log::warn!("[{}] tool node reached without pending tool calls", state.run_id);
        return Vec::new();
    }
    log::debug!(
        "[{}] executing {} tool call(s) for '{}'",
        state.run_id,
        calls.len(),
        last.author_label()
    );
    execute_tool_calls(tools, calls).await
}
