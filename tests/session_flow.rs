//! End-to-end flow: session engine, tool dispatch, task bridge, and the
//! file-backed history store working together.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use palaver::prelude::*;
use palaver::validate::validate_report;

struct ScriptedBackend {
    replies: Mutex<VecDeque<ModelReply>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<ModelReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(
        &self,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> palaver::Result<ModelReply> {
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ModelReply::Answer("nothing left to say".into())))
    }
}

struct ScriptedSource {
    polls: Mutex<VecDeque<TaskUpdate>>,
}

impl ScriptedSource {
    fn new(polls: Vec<TaskUpdate>) -> Arc<Self> {
        Arc::new(Self {
            polls: Mutex::new(polls.into()),
        })
    }
}

#[async_trait]
impl TaskSource for ScriptedSource {
    async fn start(
        &self,
        _server: &str,
        _skill: &str,
        _payload: &serde_json::Value,
    ) -> palaver::Result<String> {
        Ok("remote-1".into())
    }

    async fn poll(&self, _server: &str, _remote_ref: &str) -> palaver::Result<TaskUpdate> {
        Ok(self.polls.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn send(&self, _server: &str, _remote_ref: &str, _message: &str) -> palaver::Result<()> {
        Ok(())
    }

    async fn cancel(&self, _server: &str, _remote_ref: &str) -> palaver::Result<()> {
        Ok(())
    }
}

fn quiet_bridge(source: Arc<dyn TaskSource>, checkpoint: Option<std::path::PathBuf>) -> TaskBridge {
    TaskBridge::new(
        source,
        BridgeConfig {
            // Tests drive poll_once directly.
            poll_interval: Duration::from_secs(3600),
            checkpoint_path: checkpoint,
            ..BridgeConfig::default()
        },
    )
}

fn registry_with_skill(bridge: &TaskBridge) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SkillTool::new(
        "research",
        "summarize",
        "Summarize a topic in the background.",
        bridge.clone(),
    )));
    for tool in palaver::bridge::management_tools(bridge) {
        registry.register(tool);
    }
    Arc::new(registry)
}

#[tokio::test]
async fn background_task_output_reaches_the_next_turn() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(dir.path()).unwrap());

    let source = ScriptedSource::new(vec![
        TaskUpdate {
            messages: vec!["summary ready: rust is 20 years old".into()],
            state: RemoteTaskState::Completed,
        },
    ]);
    let bridge = quiet_bridge(source, None);
    let registry = registry_with_skill(&bridge);

    let backend = ScriptedBackend::new(vec![
        ModelReply::ToolCalls {
            content: None,
            calls: vec![ToolCall::new(
                "c1",
                "research_summarize",
                json!({"request": "history of rust"}),
            )],
        },
        ModelReply::Answer("I started a background task for that.".into()),
        ModelReply::Answer("The summary came back: rust is 20 years old.".into()),
    ]);
    let engine = SessionEngine::new(backend, store.clone(), registry).with_bridge(bridge.clone());

    // Turn 1: the model starts a background skill and answers.
    let outcome = engine.run_turn("conv", "summarize rust history").await.unwrap();
    assert_eq!(outcome.started_tasks.len(), 1);
    let task_id = outcome.started_tasks[0].task_id.clone();
    assert_eq!(bridge.status(&task_id).await.unwrap(), TaskStatus::Running);

    // The poller would do this in the background.
    let status = bridge.poll_once(&task_id).await.unwrap();
    assert_eq!(status, TaskStatus::Completed);

    // Turn 2: the update is injected before the user message.
    engine.run_turn("conv", "any news?").await.unwrap();

    let conv = store.load("conv").await.unwrap();
    let history = conv.messages();
    let (_, report) = validate_report(history);
    assert!(report.is_clean());

    // user, assistant call, tool ack, assistant answer, then the injected
    // system update ahead of the second user message.
    assert_eq!(history[0].role, Role::User);
    assert!(history[1].has_tool_calls());
    assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(history[3].role, Role::Assistant);
    assert_eq!(history[4].role, Role::System);
    assert!(history[4].text().contains(&task_id));
    assert!(history[4].text().contains("summary ready"));
    assert_eq!(history[5].text(), "any news?");
    assert_eq!(history.len(), 7);

    bridge.shutdown().await;
}

#[tokio::test]
async fn injections_never_appear_between_tool_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(dir.path()).unwrap());

    let source = ScriptedSource::new(vec![TaskUpdate {
        messages: vec!["mid-turn update".into()],
        state: RemoteTaskState::Running,
    }]);
    let bridge = quiet_bridge(source, None);
    let registry = registry_with_skill(&bridge);

    // Two tool rounds in one turn; an update arrives between them.
    let backend_bridge = bridge.clone();
    let backend = ScriptedBackend::new(vec![
        ModelReply::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("c1", "research_summarize", json!({"request": "x"}))],
        },
        ModelReply::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("c2", "list_tasks", json!({}))],
        },
        ModelReply::Answer("done".into()),
    ]);
    let engine = SessionEngine::new(backend, store.clone(), registry).with_bridge(bridge.clone());

    let outcome = engine.run_turn("conv", "go").await.unwrap();
    let task_id = outcome.started_tasks[0].task_id.clone();
    backend_bridge.poll_once(&task_id).await.unwrap();

    let conv = store.load("conv").await.unwrap();
    // No system injection inside the turn that already ran.
    assert!(conv.messages().iter().all(|m| m.role != Role::System));

    // It shows up at the next turn boundary instead.
    engine.run_turn("conv", "and now?").await.unwrap();
    let conv = store.load("conv").await.unwrap();
    let system_positions: Vec<usize> = conv
        .messages()
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::System)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(system_positions.len(), 1);
    let user_go_and_now = conv
        .messages()
        .iter()
        .position(|m| m.text() == "and now?")
        .unwrap();
    assert_eq!(system_positions[0] + 1, user_go_and_now);

    bridge.shutdown().await;
}

#[tokio::test]
async fn boundary_flush_delivers_each_injection_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(dir.path()).unwrap());

    let source = ScriptedSource::new(vec![TaskUpdate {
        messages: vec!["progress".into()],
        state: RemoteTaskState::Running,
    }]);
    let bridge = quiet_bridge(source, None);
    let registry = registry_with_skill(&bridge);

    let backend = ScriptedBackend::new(vec![
        ModelReply::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("c1", "research_summarize", json!({"request": "x"}))],
        },
        ModelReply::Answer("started".into()),
        ModelReply::Answer("noted".into()),
    ]);
    let engine = SessionEngine::new(backend, store.clone(), registry).with_bridge(bridge.clone());

    let outcome = engine.run_turn("conv", "go").await.unwrap();
    bridge.poll_once(&outcome.started_tasks[0].task_id).await.unwrap();

    // The turn flushes on both sides of the user append; a queued update
    // must come through once, ahead of the user message, never twice.
    engine.run_turn("conv", "how is it going?").await.unwrap();

    let conv = store.load("conv").await.unwrap();
    let system_positions: Vec<usize> = conv
        .messages()
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::System)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(system_positions.len(), 1);
    let user_position = conv
        .messages()
        .iter()
        .position(|m| m.text() == "how is it going?")
        .unwrap();
    assert!(system_positions[0] < user_position);

    bridge.shutdown().await;
}

#[tokio::test]
async fn bridge_recovers_tasks_after_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("tasks.json");
    let store: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(dir.path()).unwrap());

    // First process: start a task, poll once so it opens remotely.
    {
        let source = ScriptedSource::new(vec![TaskUpdate {
            messages: vec!["working".into()],
            state: RemoteTaskState::Running,
        }]);
        let bridge = quiet_bridge(source, Some(checkpoint.clone()));
        let registry = registry_with_skill(&bridge);
        let backend = ScriptedBackend::new(vec![
            ModelReply::ToolCalls {
                content: None,
                calls: vec![ToolCall::new("c1", "research_summarize", json!({"request": "x"}))],
            },
            ModelReply::Answer("started".into()),
        ]);
        let engine = SessionEngine::new(backend, store.clone(), registry).with_bridge(bridge.clone());
        let outcome = engine.run_turn("conv", "go").await.unwrap();
        bridge.poll_once(&outcome.started_tasks[0].task_id).await.unwrap();
        bridge.shutdown().await;
    }

    // Second process: restore, finish the task, deliver its completion.
    let source = ScriptedSource::new(vec![TaskUpdate {
        messages: vec!["all done".into()],
        state: RemoteTaskState::Completed,
    }]);
    let bridge = quiet_bridge(source, Some(checkpoint));
    bridge.restore().await.unwrap();

    let records = bridge.list().await;
    assert_eq!(records.len(), 1);
    let task_id = records[0].id.clone();
    assert_eq!(records[0].status, TaskStatus::Running);
    assert_eq!(records[0].remote_ref.as_deref(), Some("remote-1"));

    let status = bridge.poll_once(&task_id).await.unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let registry = registry_with_skill(&bridge);
    let backend = ScriptedBackend::new(vec![ModelReply::Answer("it finished".into())]);
    let engine = SessionEngine::new(backend, store.clone(), registry).with_bridge(bridge.clone());
    engine.run_turn("conv", "status?").await.unwrap();

    let conv = store.load("conv").await.unwrap();
    let injected: Vec<&Message> = conv
        .messages()
        .iter()
        .filter(|m| m.role == Role::System)
        .collect();
    // One injection from before the restart, one for completion after it.
    assert_eq!(injected.len(), 2);
    assert!(injected[0].text().contains("working"));
    assert!(injected[1].text().contains("all done"));

    let (_, report) = validate_report(conv.messages());
    assert!(report.is_clean());
    bridge.shutdown().await;
}

#[tokio::test]
async fn management_tools_round_trip_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(dir.path()).unwrap());

    let source = ScriptedSource::new(vec![]);
    let bridge = quiet_bridge(source, None);
    let registry = registry_with_skill(&bridge);

    let backend = ScriptedBackend::new(vec![
        ModelReply::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("c1", "research_summarize", json!({"request": "x"}))],
        },
        ModelReply::Answer("started".into()),
        ModelReply::ToolCalls {
            content: None,
            calls: vec![ToolCall::new("c2", "task_status", json!({"task_id": "bogus"}))],
        },
        ModelReply::Answer("that task does not exist".into()),
    ]);
    let engine = SessionEngine::new(backend, store.clone(), registry).with_bridge(bridge.clone());

    engine.run_turn("conv", "go").await.unwrap();
    engine.run_turn("conv", "check a bogus id").await.unwrap();

    let conv = store.load("conv").await.unwrap();
    // The bad id surfaced as tool response content, not as a turn failure.
    let status_response = conv
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c2"))
        .unwrap();
    assert!(status_response.text().contains("not found"));

    let (_, report) = validate_report(conv.messages());
    assert!(report.is_clean());
    bridge.shutdown().await;
}
