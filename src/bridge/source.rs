//! Abstraction over the remote side of the task bridge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// State the remote side reports for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTaskState {
    Running,
    WaitingForInput,
    Completed,
    Failed,
}

impl Default for RemoteTaskState {
    fn default() -> Self {
        Self::Running
    }
}

/// One poll's worth of remote output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// New output since the last poll, oldest first. May be empty.
    #[serde(default)]
    pub messages: Vec<String>,
    pub state: RemoteTaskState,
}

/// Where bridged tasks actually run.
///
/// The bridge never talks to a wire directly; it goes through this trait so
/// tests can substitute a scripted source.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Open a task on the named server. Returns the remote reference used
    /// for all later calls about this task.
    async fn start(&self, server: &str, skill: &str, payload: &serde_json::Value)
        -> Result<String>;

    /// Fetch new output and the current remote state.
    async fn poll(&self, server: &str, remote_ref: &str) -> Result<TaskUpdate>;

    /// Deliver input to a task that asked for it.
    async fn send(&self, server: &str, remote_ref: &str, message: &str) -> Result<()>;

    /// Request remote cancellation. Best effort; the caller treats the task
    /// as cancelled regardless of the result.
    async fn cancel(&self, server: &str, remote_ref: &str) -> Result<()>;
}
