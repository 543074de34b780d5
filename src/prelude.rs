//! Commonly used items, importable in one line.

pub use crate::backend::{ModelBackend, ModelReply, ToolDescriptor};
pub use crate::bridge::{
    BridgeConfig, RemoteTaskState, SkillTool, TaskBridge, TaskHandle, TaskSource, TaskStatus,
    TaskUpdate,
};
pub use crate::config::PalaverConfig;
pub use crate::engine::{SessionEngine, TurnOutcome};
pub use crate::error::{PalaverError, Result};
pub use crate::history::{Conversation, FileHistoryStore, HistoryStore};
pub use crate::protocol::{LineClient, RemoteTaskSource};
pub use crate::tools::{
    FnTool, Tool, ToolArguments, ToolContext, ToolKind, ToolOutcome, ToolParameters, ToolRegistry,
};
pub use crate::types::{Message, Role, ToolCall};
pub use crate::validate::{validate, validate_report, ValidationReport};
