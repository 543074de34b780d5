//! Bridging of long-running remote tasks into conversations.

pub mod pump;
pub mod source;
pub mod task;
pub mod tools;

pub use pump::{BridgeConfig, TaskBridge};
pub use source::{RemoteTaskState, TaskSource, TaskUpdate};
pub use task::{TaskHandle, TaskRecord, TaskStatus};
pub use tools::{
    management_tools, CancelTaskTool, ListTasksTool, SendToTaskTool, SkillTool, TaskStatusTool,
};
