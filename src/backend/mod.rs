//! Model backend capability boundary.
//!
//! The core depends only on this capability: submit an ordered history plus
//! the available tool descriptors, receive either a plain answer or a set of
//! requested tool invocations. No vendor wire format leaks past this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Message, ToolCall};

/// Description of one tool, as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

/// What the model produced for one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A plain text answer; the turn is complete.
    Answer(String),
    /// The model wants tools invoked before it can answer.
    ToolCalls {
        /// Optional assistant text accompanying the calls.
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// The completion capability the session engine drives.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, history: &[Message], tools: &[ToolDescriptor]) -> Result<ModelReply>;
}
