//! Conversation message records
//!
//! The message list is the one state field with append semantics: every
//! step's messages are concatenated onto the history, never replaced or
//! reordered. See [`State::merge`](crate::state::State::merge).
//!
//! ```rust
//! use stepgraph_core::messages::{Message, MessageRole};
//!
//! let question = Message::human("What is a checkpoint?");
//! let reply = Message::assistant("A durable snapshot of a thread.");
//!
//! assert_eq!(question.role, MessageRole::Human);
//! assert_eq!(reply.text(), "A durable snapshot of a thread.");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of the message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions for the model
    System,
    /// End-user input
    Human,
    /// Model output
    Assistant,
    /// Result of a tool invocation
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::Human => "human",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Optional unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: MessageRole,

    pub content: String,

    /// Optional sender name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Free-form metadata (model, token usage, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            name: None,
            metadata: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Tool, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a metadata entry, creating the map on first use
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn is_human(&self) -> bool {
        self.role == MessageRole::Human
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

/// Messages with the given role, in order
pub fn filter_by_role(messages: &[Message], role: MessageRole) -> Vec<&Message> {
    messages.iter().filter(|m| m.role == role).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_set_role() {
        assert_eq!(Message::system("s").role, MessageRole::System);
        assert_eq!(Message::human("h").role, MessageRole::Human);
        assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
        assert_eq!(Message::tool("t").role, MessageRole::Tool);
    }

    #[test]
    fn test_serialized_shape() {
        let msg = Message::human("hi");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"role": "human", "content": "hi"})
        );

        let msg = Message::assistant("ok")
            .with_id("m-1")
            .with_metadata("model", json!("local"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], "m-1");
        assert_eq!(value["metadata"]["model"], "local");

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_filter_by_role() {
        let messages = vec![
            Message::system("rules"),
            Message::human("q1"),
            Message::assistant("a1"),
            Message::human("q2"),
        ];

        let humans = filter_by_role(&messages, MessageRole::Human);
        assert_eq!(humans.len(), 2);
        assert_eq!(humans[1].text(), "q2");
    }
}
