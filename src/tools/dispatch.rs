//! Tool invocation dispatch.
//!
//! The dispatcher's one hard obligation: every request produces exactly one
//! tool-role response message with the originating `tool_call_id`. Failures
//! of any kind (unknown tool, bad arguments, execution error) become
//! structured error content the model can see and recover from; they never
//! propagate as run failures, since an unanswered tool call would make the
//! history unsubmittable.

use std::sync::Arc;

use futures::future::join_all;

use super::arguments::ToolArguments;
use super::registry::ToolRegistry;
use super::tool::{ToolContext, ToolOutcome};
use crate::bridge::TaskHandle;
use crate::types::{Message, ToolCall};

/// One requested tool invocation, derived from an assistant message's
/// tool calls. Lives only for the duration of a dispatch cycle.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn from_calls(calls: &[ToolCall]) -> Vec<Self> {
        calls
            .iter()
            .map(|call| Self {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .collect()
    }
}

/// What one dispatch produced: the paired response message, plus the task
/// handle when a background tool started one.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub message: Message,
    pub task: Option<TaskHandle>,
}

/// Executes tool requests against the registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch a single request. Infallible by contract.
    pub async fn dispatch(&self, request: &ToolRequest, conversation_id: &str) -> DispatchOutcome {
        let Some(tool) = self.registry.get(&request.name) else {
            tracing::warn!(tool = %request.name, call_id = %request.id, "unknown tool requested");
            return DispatchOutcome {
                message: Message::tool(
                    &request.id,
                    error_content("unknown_tool", &format!("no tool named {:?}", request.name)),
                ),
                task: None,
            };
        };

        let args = ToolArguments::new(request.arguments.clone());
        let ctx = ToolContext {
            conversation_id: Some(conversation_id.to_string()),
            tool_call_id: Some(request.id.clone()),
        };

        match tool.invoke(&args, &ctx).await {
            Ok(ToolOutcome::Completed(value)) => {
                tracing::debug!(tool = %request.name, call_id = %request.id, "tool completed");
                DispatchOutcome {
                    message: Message::tool(&request.id, value_to_content(value)),
                    task: None,
                }
            }
            Ok(ToolOutcome::Started(handle)) => {
                tracing::debug!(
                    tool = %request.name,
                    call_id = %request.id,
                    task_id = %handle.task_id,
                    "background task started"
                );
                let ack = format!(
                    "task started: id={} ({}/{}); interim updates will appear between turns",
                    handle.task_id, handle.server, handle.skill
                );
                DispatchOutcome {
                    message: Message::tool(&request.id, ack),
                    task: Some(handle),
                }
            }
            Err(err) => {
                tracing::warn!(tool = %request.name, call_id = %request.id, error = %err, "tool failed");
                DispatchOutcome {
                    message: Message::tool(
                        &request.id,
                        error_content("tool_execution_error", &err.to_string()),
                    ),
                    task: None,
                }
            }
        }
    }

    /// Dispatch a full round of requests concurrently.
    ///
    /// Requests within one round are independent; responses come back in
    /// request order so the appended round reads naturally.
    pub async fn dispatch_all(
        &self,
        requests: &[ToolRequest],
        conversation_id: &str,
    ) -> Vec<DispatchOutcome> {
        join_all(
            requests
                .iter()
                .map(|request| self.dispatch(request, conversation_id)),
        )
        .await
    }
}

fn error_content(kind: &str, message: &str) -> String {
    serde_json::json!({
        "error": { "kind": kind, "message": message }
    })
    .to_string()
}

fn value_to_content(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}
