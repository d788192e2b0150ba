//! Conversation messages.
//!
//! A [`Message`] is a closed union over the four roles a transcript can hold.
//! Assistant messages carry the name of the agent that wrote them so the
//! supervisor and the deduplication pass can tell agents apart.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier, echoed back in the tool result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed arguments object.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    System {
        content: String,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// An assistant message authored by `author`.
    pub fn assistant(author: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Assistant {
            author: Some(author.into()),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// An assistant message that requests tool calls.
    pub fn assistant_with_tools(
        author: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Message::Assistant {
            author: Some(author.into()),
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::User { content }
            | Message::System { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Label used to attribute the message: the agent name for assistant
    /// messages, otherwise the role.
    pub fn author_label(&self) -> &str {
        match self {
            Message::User { .. } => "user",
            Message::System { .. } => "system",
            Message::Tool { .. } => "tool",
            Message::Assistant { author, .. } => author.as_deref().unwrap_or("assistant"),
        }
    }

    pub fn author(&self) -> Option<&str> {
        match self {
            Message::Assistant { author, .. } => author.as_deref(),
            _ => None,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }

    /// Overwrite the author of an assistant message. Other roles are left
    /// unchanged.
    pub fn stamp_author(&mut self, name: &str) {
        if let Message::Assistant { author, .. } = self {
            *author = Some(name.to_string());
        }
    }

    /// Strip the requested tool calls and return them. An assistant message
    /// left with no content records the tool names instead.
    pub fn drop_tool_calls(&mut self) -> Vec<ToolCall> {
        let Message::Assistant {
            content,
            tool_calls,
            ..
        } = self
        else {
            return Vec::new();
        };
        let dropped = std::mem::take(tool_calls);
        if !dropped.is_empty() && content.trim().is_empty() {
            let names: Vec<&str> = dropped.iter().map(|c| c.name.as_str()).collect();
            *content = format!("(requested tools: {})", names.join(", "));
        }
        dropped
    }

    /// Key under which two messages are considered duplicates.
    ///
    /// Tool results and tool-call requests are keyed by call id as well, so
    /// identical outputs of distinct calls and repeated empty-content
    /// requests both survive.
    pub fn dedup_key(&self) -> (String, String) {
        match self {
            Message::Tool {
                tool_call_id,
                content,
                ..
            } => (format!("tool:{tool_call_id}"), content.clone()),
            Message::Assistant {
                content,
                tool_calls,
                ..
            } if !tool_calls.is_empty() => {
                let ids: Vec<&str> = tool_calls.iter().map(|c| c.id.as_str()).collect();
                (
                    format!("{}:calls:{}", self.author_label(), ids.join(",")),
                    content.clone(),
                )
            }
            other => (other.author_label().to_string(), other.content().to_string()),
        }
    }
}
