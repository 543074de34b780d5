//! Task records and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle state of a bridged task, as tracked locally.
///
/// `Running` may move to any other state. `WaitingForInput` only returns to
/// `Running` (when input is sent) or ends in `Cancelled`; a remote report of
/// a terminal state while waiting passes through `Running` first. Terminal
/// states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Running,
    WaitingForInput,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Everything the bridge knows about one task. Serialized into the
/// checkpoint file so tasks survive a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Locally generated id; stable across restarts.
    pub id: String,
    /// Identifier assigned by the remote side, once the task has actually
    /// been opened there. `None` until the first successful poll cycle.
    pub remote_ref: Option<String>,
    /// The tool call that started this task.
    pub owning_tool_call_id: Option<String>,
    /// Conversation that receives this task's update injections.
    pub conversation_id: String,
    pub server: String,
    pub skill: String,
    /// Payload to open the remote task with; kept until `remote_ref` exists.
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    /// Consecutive poll failures; reset on any successful poll.
    pub consecutive_failures: u32,
}

/// Lightweight handle returned to callers when a task starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_id: String,
    pub server: String,
    pub skill: String,
}
