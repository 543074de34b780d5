//! Tools exposing the task bridge to the model.
//!
//! Management tools return `Err` for unknown ids and invalid states; the
//! dispatcher renders those as response content, so the model sees the
//! problem instead of the run aborting.

use std::sync::Arc;

use async_trait::async_trait;

use super::pump::TaskBridge;
use crate::error::{PalaverError, Result};
use crate::tools::{Tool, ToolArguments, ToolContext, ToolKind, ToolOutcome, ToolParameters};

/// Starts a remote skill as a background task.
///
/// Registered under `{server}_{skill}` so each remote capability shows up
/// as its own tool in the model's toolset.
pub struct SkillTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    server: String,
    skill: String,
    bridge: TaskBridge,
}

impl SkillTool {
    pub fn new(
        server: impl Into<String>,
        skill: impl Into<String>,
        description: impl Into<String>,
        bridge: TaskBridge,
    ) -> Self {
        let server = server.into();
        let skill = skill.into();
        Self {
            name: format!("{server}_{skill}"),
            description: description.into(),
            parameters: ToolParameters::object()
                .string("request", "what the task should do", true)
                .build(),
            server,
            skill,
            bridge,
        }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Background
    }

    async fn invoke(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<ToolOutcome> {
        let conversation_id = ctx.conversation_id.clone().ok_or_else(|| {
            PalaverError::InvalidState("background tool invoked outside a conversation".into())
        })?;
        let handle = self
            .bridge
            .start(
                &conversation_id,
                &self.server,
                &self.skill,
                args.raw().clone(),
                ctx.tool_call_id.clone(),
            )
            .await?;
        Ok(ToolOutcome::Started(handle))
    }
}

/// Lists tracked tasks and their states, newest first.
pub struct ListTasksTool {
    parameters: ToolParameters,
    bridge: TaskBridge,
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List background tasks with their current states, newest first."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn invoke(&self, args: &ToolArguments, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let records = self.bridge.list().await;
        let limit = args
            .integer("limit")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(records.len());
        let listing: Vec<serde_json::Value> = records
            .iter()
            .take(limit)
            .map(|record| {
                serde_json::json!({
                    "task_id": record.id,
                    "server": record.server,
                    "skill": record.skill,
                    "status": record.status,
                    "created_at": record.created_at,
                })
            })
            .collect();
        Ok(ToolOutcome::Completed(serde_json::json!({
            "tasks": listing,
            "total": records.len(),
        })))
    }
}

/// Reports the status of one task.
pub struct TaskStatusTool {
    parameters: ToolParameters,
    bridge: TaskBridge,
}

#[async_trait]
impl Tool for TaskStatusTool {
    fn name(&self) -> &str {
        "task_status"
    }

    fn description(&self) -> &str {
        "Get the current status of a background task by id."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn invoke(&self, args: &ToolArguments, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let task_id = args.require_str("task_id")?;
        let status = self.bridge.status(task_id).await?;
        Ok(ToolOutcome::Completed(serde_json::json!({
            "task_id": task_id,
            "status": status,
        })))
    }
}

/// Delivers input to a task that is waiting for it.
pub struct SendToTaskTool {
    parameters: ToolParameters,
    bridge: TaskBridge,
}

#[async_trait]
impl Tool for SendToTaskTool {
    fn name(&self) -> &str {
        "send_to_task"
    }

    fn description(&self) -> &str {
        "Send a message to a running or input-waiting background task."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn invoke(&self, args: &ToolArguments, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let task_id = args.require_str("task_id")?;
        let message = args.require_str("message")?;
        self.bridge.send(task_id, message).await?;
        Ok(ToolOutcome::Completed(serde_json::json!({
            "task_id": task_id,
            "delivered": true,
        })))
    }
}

/// Cancels a task.
pub struct CancelTaskTool {
    parameters: ToolParameters,
    bridge: TaskBridge,
}

#[async_trait]
impl Tool for CancelTaskTool {
    fn name(&self) -> &str {
        "cancel_task"
    }

    fn description(&self) -> &str {
        "Cancel a background task by id."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn invoke(&self, args: &ToolArguments, _ctx: &ToolContext) -> Result<ToolOutcome> {
        let task_id = args.require_str("task_id")?;
        self.bridge.cancel(task_id).await?;
        Ok(ToolOutcome::Completed(serde_json::json!({
            "task_id": task_id,
            "cancelled": true,
        })))
    }
}

/// The standard task management toolset.
pub fn management_tools(bridge: &TaskBridge) -> Vec<Arc<dyn Tool>> {
    let task_id_param = || {
        ToolParameters::object()
            .string("task_id", "id of the task", true)
            .build()
    };
    vec![
        Arc::new(ListTasksTool {
            parameters: ToolParameters::object()
                .integer("limit", "return at most this many tasks", false)
                .build(),
            bridge: bridge.clone(),
        }),
        Arc::new(TaskStatusTool {
            parameters: task_id_param(),
            bridge: bridge.clone(),
        }),
        Arc::new(SendToTaskTool {
            parameters: ToolParameters::object()
                .string("task_id", "id of the task", true)
                .string("message", "message to deliver to the task", true)
                .build(),
            bridge: bridge.clone(),
        }),
        Arc::new(CancelTaskTool {
            parameters: task_id_param(),
            bridge: bridge.clone(),
        }),
    ]
}
