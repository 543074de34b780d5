//! The session engine: runs one user turn to completion.
//!
//! A turn is: drain task injections, append the user message, then loop
//! model call and tool dispatch until the model answers in plain text or
//! the round limit aborts the turn. Injections enter the history only at
//! the turn boundary, never between tool rounds, so a round's tool-call
//! pairs stay contiguous.

use std::sync::Arc;

use crate::backend::{ModelBackend, ModelReply};
use crate::bridge::{TaskBridge, TaskHandle};
use crate::error::{PalaverError, Result};
use crate::history::HistoryStore;
use crate::tools::{Dispatcher, ToolRegistry, ToolRequest};
use crate::types::Message;
use crate::validate;

/// What one completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The model's final text reply.
    pub reply: String,
    /// Tool rounds used this turn.
    pub rounds: usize,
    /// Background tasks started during the turn.
    pub started_tasks: Vec<TaskHandle>,
}

/// Drives conversations against a model backend.
pub struct SessionEngine {
    backend: Arc<dyn ModelBackend>,
    store: Arc<dyn HistoryStore>,
    registry: Arc<ToolRegistry>,
    dispatcher: Dispatcher,
    bridge: Option<TaskBridge>,
    system_prompt: Option<String>,
    max_tool_rounds: usize,
}

impl SessionEngine {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        store: Arc<dyn HistoryStore>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            backend,
            store,
            dispatcher: Dispatcher::new(registry.clone()),
            registry,
            bridge: None,
            system_prompt: None,
            max_tool_rounds: 32,
        }
    }

    /// Attach a task bridge; its injections are drained at turn boundaries.
    pub fn with_bridge(mut self, bridge: TaskBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// System prompt prepended to new conversations on their first turn.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Override the tool round limit for a turn.
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn bridge(&self) -> Option<&TaskBridge> {
        self.bridge.as_ref()
    }

    /// Run one user turn. Everything appended during the turn is persisted
    /// before returning, including on failure, so the stored history never
    /// ends mid-round.
    pub async fn run_turn(&self, conversation_id: &str, user_input: &str) -> Result<TurnOutcome> {
        let mut history = match self.store.load(conversation_id).await {
            Ok(conversation) => conversation.into_messages(),
            Err(PalaverError::NotFound(_)) => Vec::new(),
            Err(err) => return Err(err),
        };
        let mut appended: Vec<Message> = Vec::new();

        if history.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                appended.push(Message::system(prompt.clone()));
            }
        }
        // Pending task updates are flushed on both sides of the user append;
        // the queue is usually empty the second time, but an update that
        // races in between the drains still makes this turn.
        if let Some(bridge) = &self.bridge {
            appended.extend(bridge.drain_injections(conversation_id).await);
        }
        appended.push(Message::user(user_input));
        if let Some(bridge) = &self.bridge {
            appended.extend(bridge.drain_injections(conversation_id).await);
        }
        history.extend(appended.iter().cloned());

        let result = self
            .drive(conversation_id, &mut history, &mut appended)
            .await;

        // The failure paths below leave only complete rounds in `appended`.
        self.store.append(conversation_id, &appended).await?;
        result
    }

    async fn drive(
        &self,
        conversation_id: &str,
        history: &mut Vec<Message>,
        appended: &mut Vec<Message>,
    ) -> Result<TurnOutcome> {
        let tools = self.registry.descriptors();
        let mut started_tasks = Vec::new();
        let mut rounds = 0;

        loop {
            // History is valid by construction here; submitted sequences are
            // still validated, since the backend rejects violations outright.
            let (submission, report) = validate::validate_report(history);
            if !report.is_clean() {
                tracing::warn!(
                    conversation_id,
                    dropped = report.dropped(),
                    "submission history needed repair"
                );
            }
            let reply = self.backend.complete(&submission, &tools).await?;
            match reply {
                ModelReply::Answer(text) => {
                    let message = Message::assistant(text.as_str());
                    history.push(message.clone());
                    appended.push(message);
                    tracing::info!(conversation_id, rounds, "turn completed");
                    return Ok(TurnOutcome { reply: text, rounds, started_tasks });
                }
                ModelReply::ToolCalls { content, calls } => {
                    // Checked before the assistant message is appended so an
                    // aborted turn never persists unanswered tool calls.
                    if rounds >= self.max_tool_rounds {
                        tracing::warn!(
                            conversation_id,
                            max = self.max_tool_rounds,
                            "tool round limit reached"
                        );
                        return Err(PalaverError::DepthExceeded(self.max_tool_rounds));
                    }
                    rounds += 1;

                    let assistant = Message::assistant_tool_calls(content, calls.clone());
                    history.push(assistant.clone());
                    appended.push(assistant);

                    let requests = ToolRequest::from_calls(&calls);
                    let outcomes = self
                        .dispatcher
                        .dispatch_all(&requests, conversation_id)
                        .await;
                    for outcome in outcomes {
                        history.push(outcome.message.clone());
                        appended.push(outcome.message);
                        if let Some(handle) = outcome.task {
                            started_tasks.push(handle);
                        }
                    }
                }
            }
        }
    }
}
