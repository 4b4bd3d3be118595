//! Conversation state and its merge rule
//!
//! A [`State`] is a map of named fields plus one distinguished field, the
//! ordered message history. Handlers return *partial* states; the engine
//! folds them into the thread's state with [`State::merge`]:
//!
//! | Field | Reducer |
//! |-------|---------|
//! | `messages` | append (concatenate in order) |
//! | anything else | overwrite (last write wins) |
//!
//! ```rust
//! use stepgraph_core::{Message, State};
//! use serde_json::json;
//!
//! let mut state = State::new()
//!     .with_message(Message::human("hi"))
//!     .with_value("status", json!("thinking"));
//!
//! state.merge(
//!     State::new()
//!         .with_message(Message::assistant("hello"))
//!         .with_value("status", json!("done")),
//! );
//!
//! assert_eq!(state.messages.len(), 2);
//! assert_eq!(state.get("status"), Some(&json!("done")));
//! ```
//!
//! # Persisted form
//!
//! Checkpoints store the state as a flat JSON object in which the history
//! lives under the `"messages"` key, see [`State::to_values`].

use crate::error::{GraphError, Result};
use crate::messages::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the message history is persisted
pub const MESSAGES_KEY: &str = "messages";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Append-only conversation history
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Every other field, overwritten on merge
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// A partial state carrying a single message
    pub fn from_message(message: Message) -> Self {
        Self::new().with_message(message)
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set a plain field
    ///
    /// The `"messages"` key is reserved for the history and is ignored here.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    /// Set a plain field in place; returns false for the reserved key
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if key == MESSAGES_KEY {
            return false;
        }
        self.values.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize a plain field into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.values
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| GraphError::State(format!("field '{}': {}", key, e)))
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// True when there is nothing to merge
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.values.is_empty()
    }

    /// Fold a partial update into this state
    ///
    /// Messages are appended in order; other fields overwrite.
    pub fn merge(&mut self, update: State) {
        self.messages.extend(update.messages);
        for (key, value) in update.values {
            self.values.insert(key, value);
        }
    }

    /// Owned variant of [`merge`](Self::merge)
    pub fn merged(mut self, update: State) -> State {
        self.merge(update);
        self
    }

    /// Flatten into the persisted JSON object
    pub fn to_values(&self) -> Result<Map<String, Value>> {
        let mut map = self.values.clone();
        map.insert(MESSAGES_KEY.to_string(), serde_json::to_value(&self.messages)?);
        Ok(map)
    }

    /// Rebuild from the persisted JSON object
    pub fn from_values(mut values: Map<String, Value>) -> Result<Self> {
        let messages = match values.remove(MESSAGES_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| GraphError::State(format!("invalid message history: {}", e)))?,
        };

        Ok(Self { messages, values })
    }
}

impl From<Message> for State {
    fn from(message: Message) -> Self {
        State::from_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_appends_messages_and_overwrites_fields() {
        let mut state = State::new()
            .with_message(Message::human("q"))
            .with_value("route", json!("confirm"))
            .with_value("kept", json!(1));

        state.merge(
            State::new()
                .with_message(Message::assistant("a"))
                .with_value("route", json!("end")),
        );

        let texts: Vec<_> = state.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["q", "a"]);
        assert_eq!(state.get("route"), Some(&json!("end")));
        assert_eq!(state.get("kept"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_empty_update_is_noop() {
        let state = State::from_message(Message::human("q"));
        assert_eq!(state.clone().merged(State::new()), state);
    }

    #[test]
    fn test_values_round_trip() {
        let state = State::new()
            .with_message(Message::human("hi"))
            .with_value("count", json!(3));

        let values = state.to_values().unwrap();
        assert_eq!(values["messages"][0]["content"], "hi");
        assert_eq!(values["count"], 3);

        assert_eq!(State::from_values(values).unwrap(), state);
    }

    #[test]
    fn test_from_values_without_history() {
        let mut values = Map::new();
        values.insert("x".into(), json!(true));

        let state = State::from_values(values).unwrap();
        assert!(state.messages.is_empty());
        assert_eq!(state.get("x"), Some(&json!(true)));
    }

    #[test]
    fn test_from_values_rejects_bad_history() {
        let mut values = Map::new();
        values.insert("messages".into(), json!("not a list"));

        assert!(matches!(
            State::from_values(values),
            Err(GraphError::State(_))
        ));
    }

    #[test]
    fn test_reserved_key_is_ignored() {
        let mut state = State::new();
        assert!(!state.set("messages", json!([])));
        assert!(state.values.is_empty());
    }

    #[test]
    fn test_get_as() {
        let state = State::new().with_value("limit", json!(256));
        assert_eq!(state.get_as::<u32>("limit").unwrap(), Some(256));
        assert_eq!(state.get_as::<u32>("missing").unwrap(), None);
        assert!(state.get_as::<String>("limit").is_err());
    }
}
