//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::bridge::TaskHandle;
use crate::error::Result;

/// Declared capability of a tool.
///
/// Synchronous and background tools are distinguished by declaration, never
/// by inspecting their behavior at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Returns its result within the dispatch cycle.
    Sync,
    /// Hands work to the task bridge and returns an acknowledgment.
    Background,
}

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The conversation this invocation belongs to.
    pub conversation_id: Option<String>,
    /// The tool-call id the response will be paired with.
    pub tool_call_id: Option<String>,
}

/// What a tool invocation produced.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The tool ran to completion; the value becomes the response content.
    Completed(serde_json::Value),
    /// A background task was started and registered with the task bridge;
    /// the dispatcher turns the handle into an acknowledgment message.
    Started(TaskHandle),
}

/// Core tool trait — implement to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Declared capability.
    fn kind(&self) -> ToolKind {
        ToolKind::Sync
    }

    /// Execute the tool with parsed arguments.
    async fn invoke(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<ToolOutcome>;
}

/// Type alias for the tool handler function.
type ToolHandler = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// Closure-based synchronous tool for quick tool creation.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn invoke(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<ToolOutcome> {
        (self.handler)(args.clone(), ctx.clone())
            .await
            .map(ToolOutcome::Completed)
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fn_tool_runs_handler() {
        let tool = FnTool::new(
            "echo",
            "echoes its input",
            ToolParameters::object().string("text", "text to echo", true).build(),
            |args, _ctx| async move { Ok(json!({ "echoed": args.str("text") })) },
        );

        assert_eq!(tool.name(), "echo");
        assert_eq!(tool.kind(), ToolKind::Sync);

        let outcome = tool
            .invoke(
                &ToolArguments::new(json!({"text": "hi"})),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        match outcome {
            ToolOutcome::Completed(value) => assert_eq!(value["echoed"], "hi"),
            ToolOutcome::Started(_) => panic!("sync tool should complete"),
        }
    }
}
