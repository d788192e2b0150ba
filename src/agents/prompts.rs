//! Prompt assembly for the supervisor and the workers.
//!
//! Every prompt goes out through [`to_llm_messages`], the single place where
//! [`Message`] values are turned into provider wire messages.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::agents::parser::FINISH;
use crate::llms::base_llm::{LLMMessage, StructuredOutput};
use crate::tools::tool_set::ToolSet;
use crate::types::message::{Message, ToolCall};
use crate::utilities::string_utils::sanitize_author_name;

/// Name of the routing function the supervisor fills in.
pub const ROUTE_FUNCTION: &str = "route";

const NO_TOOLS_NOTE: &str = "No tools are available to you; answer from your own knowledge.";

const SYNTHESIS_INSTRUCTION: &str = "The team has finished working on the request. \
Read the whole conversation and write one comprehensive final answer for the user. \
Combine the findings of every agent, resolve contradictions and do not mention the routing process.";

pub fn system_message(content: &str) -> LLMMessage {
    json!({"role": "system", "content": content})
}

pub fn user_message(content: &str) -> LLMMessage {
    json!({"role": "user", "content": content})
}

fn tool_call_to_wire(call: &ToolCall) -> Value {
    let arguments = match &call.arguments {
        Value::String(s) => s.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    };
    json!({
        "id": call.id,
        "type": "function",
        "function": {"name": call.name, "arguments": arguments},
    })
}

/// Convert a transcript window into wire messages.
///
/// An assistant message keeps its `tool_calls` only when every result for
/// them is also in the window; otherwise the calls are dropped and the
/// results rendered as plain user text, since providers reject unpaired
/// tool messages.
pub fn to_llm_messages(messages: &[Message]) -> Vec<LLMMessage> {
    let result_ids: HashSet<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();

    let mut paired: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            Message::User { content } => out.push(user_message(content)),
            Message::System { content } => out.push(system_message(content)),
            Message::Assistant {
                author,
                content,
                tool_calls,
            } => {
                let mut wire = json!({"role": "assistant", "content": content});
                if let Some(author) = author {
                    wire["name"] = Value::String(sanitize_author_name(author));
                }
                let complete = !tool_calls.is_empty()
                    && tool_calls.iter().all(|c| result_ids.contains(c.id.as_str()));
                if complete {
                    wire["tool_calls"] =
                        Value::Array(tool_calls.iter().map(tool_call_to_wire).collect());
                    paired.extend(tool_calls.iter().map(|c| c.id.as_str()));
                } else if !tool_calls.is_empty() && content.trim().is_empty() {
                    let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                    wire["content"] =
                        Value::String(format!("(requested tools: {})", names.join(", ")));
                }
                out.push(wire);
            }
            Message::Tool {
                tool_call_id,
                name,
                content,
            } => {
                if paired.contains(tool_call_id.as_str()) {
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": content,
                    }));
                } else {
                    out.push(user_message(&format!("Result of tool '{name}': {content}")));
                }
            }
        }
    }
    out
}

/// Roster options in the order the supervisor sees them.
pub fn route_options(workers: &[String]) -> Vec<String> {
    std::iter::once(FINISH.to_string())
        .chain(workers.iter().cloned())
        .collect()
}

/// Closing instruction appended after the conversation in a routing prompt.
pub fn routing_instruction(workers: &[String]) -> String {
    let options: Vec<String> = route_options(workers)
        .iter()
        .map(|o| format!("'{o}'"))
        .collect();
    format!(
        "Given the conversation above, who should act next? Or should we FINISH? Select one of: [{}]",
        options.join(", ")
    )
}

/// JSON schema of the routing decision.
pub fn route_schema(workers: &[String]) -> StructuredOutput {
    StructuredOutput {
        name: ROUTE_FUNCTION.to_string(),
        description: "Select the next agent to act. Or FINISH if the task is complete.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "Your message to the team or, when finishing, to the user."
                },
                "next": {
                    "type": "string",
                    "enum": route_options(workers),
                }
            },
            "required": ["response", "next"]
        }),
    }
}

pub fn supervisor_prompt(
    system_prompt: &str,
    messages: &[Message],
    workers: &[String],
) -> Vec<LLMMessage> {
    let mut prompt = vec![system_message(system_prompt)];
    prompt.extend(to_llm_messages(messages));
    prompt.push(system_message(&routing_instruction(workers)));
    prompt
}

/// Tool note appended to a worker's system prompt.
pub fn tools_note(tools: &ToolSet) -> String {
    if tools.is_empty() {
        return NO_TOOLS_NOTE.to_string();
    }
    let lines: Vec<String> = tools
        .entries()
        .iter()
        .map(|e| format!("- {}: {}", e.name, e.tool.description()))
        .collect();
    format!(
        "You can call the following tools when they help:\n{}",
        lines.join("\n")
    )
}

pub fn worker_prompt(system_prompt: &str, tools: &ToolSet, messages: &[Message]) -> Vec<LLMMessage> {
    let system = if system_prompt.trim().is_empty() {
        tools_note(tools)
    } else {
        format!("{}\n\n{}", system_prompt.trim_end(), tools_note(tools))
    };
    let mut prompt = vec![system_message(&system)];
    prompt.extend(to_llm_messages(messages));
    prompt
}

pub fn synthesis_prompt(
    system_prompt: &str,
    transcript: &[Message],
    original_request: &str,
) -> Vec<LLMMessage> {
    let system = if system_prompt.trim().is_empty() {
        SYNTHESIS_INSTRUCTION.to_string()
    } else {
        format!("{}\n\n{}", system_prompt.trim_end(), SYNTHESIS_INSTRUCTION)
    };
    let mut prompt = vec![system_message(&system)];
    prompt.extend(to_llm_messages(transcript));
    prompt.push(user_message(&format!(
        "Original request: {original_request}\n\nWrite the final answer now."
    )));
    prompt
}
