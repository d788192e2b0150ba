//! Message and state types shared by every node of the graph.

pub mod message;
pub mod state;

pub use message::{Message, ToolCall};
pub use state::ConversationState;
