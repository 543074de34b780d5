//! Conversation history and its persistence.

mod store;

pub use store::{FileHistoryStore, HistoryStore};

use uuid::Uuid;

use crate::types::Message;

/// An identifier plus an ordered, append-only message sequence.
///
/// Exclusively owned by the session engine for the lifetime of a run;
/// persisted by a [`HistoryStore`] between runs.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with a fresh id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create an empty conversation with a known id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    /// Rebuild a conversation from already-validated messages.
    pub fn from_messages(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a single message. Appends are the only mutation.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a batch of messages.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the conversation, yielding its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
