//! The task bridge: local task records, background pollers, and the
//! injection queue that feeds remote output back into conversations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::source::{RemoteTaskState, TaskSource, TaskUpdate};
use super::task::{TaskHandle, TaskRecord, TaskStatus};
use crate::error::{PalaverError, Result};
use crate::types::Message;

/// Tuning knobs for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How often background pollers check each task.
    pub poll_interval: Duration,
    /// Consecutive poll failures before a task is marked failed.
    pub max_poll_failures: u32,
    /// How long terminal task records are kept before `sweep` removes them.
    pub retention: Duration,
    /// Where to checkpoint bridge state. `None` disables persistence.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_failures: 3,
            retention: Duration::from_secs(24 * 60 * 60),
            checkpoint_path: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BridgeState {
    tasks: HashMap<String, TaskRecord>,
    /// Injections waiting for the next turn boundary, per conversation.
    pending: HashMap<String, Vec<Message>>,
}

struct BridgeInner {
    source: Arc<dyn TaskSource>,
    state: Mutex<BridgeState>,
    pollers: Mutex<HashMap<String, CancellationToken>>,
    /// Serializes checkpoint writes. Concurrent pollers must not interleave
    /// temp-file writes or rename stale state over newer state.
    checkpoint_lock: Mutex<()>,
    config: BridgeConfig,
}

/// Bridges long-running remote tasks into conversations.
///
/// `start` registers the task and returns a handle immediately; the remote
/// task is opened lazily by the first poll so starting never blocks on the
/// wire. Remote output accumulates in a per-conversation injection queue
/// and is drained by the session engine at turn boundaries only.
#[derive(Clone)]
pub struct TaskBridge {
    inner: Arc<BridgeInner>,
}

impl TaskBridge {
    pub fn new(source: Arc<dyn TaskSource>, config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                source,
                state: Mutex::new(BridgeState::default()),
                pollers: Mutex::new(HashMap::new()),
                checkpoint_lock: Mutex::new(()),
                config,
            }),
        }
    }

    /// Reload bridge state from the checkpoint file and resume polling any
    /// task that was still live. A missing checkpoint is not an error, and
    /// an unreadable one degrades to an empty task table with a warning:
    /// persisted state is untrusted input, same as conversation files.
    pub async fn restore(&self) -> Result<()> {
        let Some(path) = self.inner.config.checkpoint_path.clone() else {
            return Ok(());
        };
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let restored: BridgeState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "checkpoint unreadable; starting with no tasks"
                );
                return Ok(());
            }
        };

        let live: Vec<String> = restored
            .tasks
            .values()
            .filter(|record| !record.status.is_terminal())
            .map(|record| record.id.clone())
            .collect();
        {
            let mut state = self.inner.state.lock().await;
            *state = restored;
        }
        tracing::info!(
            path = %path.display(),
            resumed = live.len(),
            "restored task bridge checkpoint"
        );
        for task_id in live {
            self.spawn_poller(task_id).await;
        }
        Ok(())
    }

    /// Register a task and return its handle without touching the wire.
    pub async fn start(
        &self,
        conversation_id: &str,
        server: &str,
        skill: &str,
        payload: serde_json::Value,
        owning_tool_call_id: Option<String>,
    ) -> Result<TaskHandle> {
        let now = Utc::now();
        let record = TaskRecord {
            id: Uuid::new_v4().to_string(),
            remote_ref: None,
            owning_tool_call_id,
            conversation_id: conversation_id.to_string(),
            server: server.to_string(),
            skill: skill.to_string(),
            payload,
            status: TaskStatus::Running,
            created_at: now,
            last_update_at: now,
            consecutive_failures: 0,
        };
        let handle = TaskHandle {
            task_id: record.id.clone(),
            server: record.server.clone(),
            skill: record.skill.clone(),
        };
        {
            let mut state = self.inner.state.lock().await;
            state.tasks.insert(record.id.clone(), record);
        }
        tracing::info!(task_id = %handle.task_id, server, skill, "task registered");
        self.spawn_poller(handle.task_id.clone()).await;
        self.checkpoint().await;
        Ok(handle)
    }

    /// Run one poll cycle for a task: open it remotely if that has not
    /// happened yet, fetch an update, and fold it into local state.
    ///
    /// Transient failures return an error after incrementing the failure
    /// count; once the count reaches the configured limit the task is
    /// marked failed and a final notice is queued.
    pub async fn poll_once(&self, task_id: &str) -> Result<TaskStatus> {
        let (server, skill, remote_ref, payload, status) = {
            let state = self.inner.state.lock().await;
            let record = get_task(&state.tasks, task_id)?;
            (
                record.server.clone(),
                record.skill.clone(),
                record.remote_ref.clone(),
                record.payload.clone(),
                record.status,
            )
        };
        if status.is_terminal() {
            return Ok(status);
        }

        let remote_ref = match remote_ref {
            Some(remote_ref) => remote_ref,
            None => match self.inner.source.start(&server, &skill, &payload).await {
                Ok(remote_ref) => {
                    let mut state = self.inner.state.lock().await;
                    if let Some(record) = state.tasks.get_mut(task_id) {
                        record.remote_ref = Some(remote_ref.clone());
                    }
                    drop(state);
                    tracing::debug!(task_id, remote_ref = %remote_ref, "remote task opened");
                    self.checkpoint().await;
                    remote_ref
                }
                Err(err) => return self.record_poll_failure(task_id, err).await,
            },
        };

        match self.inner.source.poll(&server, &remote_ref).await {
            Ok(update) => self.apply_update(task_id, update).await,
            Err(err) => self.record_poll_failure(task_id, err).await,
        }
    }

    /// Deliver input to a task. Valid only while the task is running or
    /// waiting for input; a waiting task goes back to running.
    pub async fn send(&self, task_id: &str, message: &str) -> Result<()> {
        let (server, remote_ref, status) = {
            let state = self.inner.state.lock().await;
            let record = get_task(&state.tasks, task_id)?;
            (record.server.clone(), record.remote_ref.clone(), record.status)
        };
        if !matches!(status, TaskStatus::Running | TaskStatus::WaitingForInput) {
            return Err(PalaverError::InvalidState(format!(
                "cannot send to task {task_id} in state {status}"
            )));
        }
        let Some(remote_ref) = remote_ref else {
            return Err(PalaverError::InvalidState(format!(
                "task {task_id} has not been opened remotely yet"
            )));
        };
        self.inner.source.send(&server, &remote_ref, message).await?;

        let mut state = self.inner.state.lock().await;
        if let Some(record) = state.tasks.get_mut(task_id) {
            if record.status == TaskStatus::WaitingForInput {
                record.status = TaskStatus::Running;
            }
            record.last_update_at = Utc::now();
        }
        drop(state);
        self.checkpoint().await;
        Ok(())
    }

    /// Cancel a task. Remote cancellation is attempted but the task is
    /// marked cancelled locally even if the wire call fails. Cancelling a
    /// task that is already terminal is a no-op.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        let (server, remote_ref, status) = {
            let state = self.inner.state.lock().await;
            let record = get_task(&state.tasks, task_id)?;
            (record.server.clone(), record.remote_ref.clone(), record.status)
        };
        if status.is_terminal() {
            return Ok(());
        }
        if let Some(remote_ref) = remote_ref {
            if let Err(err) = self.inner.source.cancel(&server, &remote_ref).await {
                tracing::warn!(task_id, error = %err, "remote cancel failed; cancelling locally");
            }
        }

        let mut state = self.inner.state.lock().await;
        if let Some(record) = state.tasks.get_mut(task_id) {
            record.status = TaskStatus::Cancelled;
            record.last_update_at = Utc::now();
            let conversation_id = record.conversation_id.clone();
            state
                .pending
                .entry(conversation_id)
                .or_default()
                .push(Message::system(format!(
                    "Task update [{task_id}]: task cancelled"
                )));
        }
        drop(state);
        self.stop_poller(task_id).await;
        self.checkpoint().await;
        tracing::info!(task_id, "task cancelled");
        Ok(())
    }

    /// Current status of a task.
    pub async fn status(&self, task_id: &str) -> Result<TaskStatus> {
        let state = self.inner.state.lock().await;
        Ok(get_task(&state.tasks, task_id)?.status)
    }

    /// Snapshot of every tracked task, newest first.
    pub async fn list(&self) -> Vec<TaskRecord> {
        let state = self.inner.state.lock().await;
        let mut records: Vec<TaskRecord> = state.tasks.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Take every injection queued for a conversation, in arrival order.
    pub async fn drain_injections(&self, conversation_id: &str) -> Vec<Message> {
        let mut state = self.inner.state.lock().await;
        let drained = state.pending.remove(conversation_id).unwrap_or_default();
        if !drained.is_empty() {
            tracing::debug!(conversation_id, count = drained.len(), "drained task injections");
        }
        drained
    }

    /// Drop terminal task records older than the retention window. Returns
    /// how many were removed.
    pub async fn sweep(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.inner.config.retention)
                .unwrap_or_else(|_| chrono::Duration::days(1));
        let removed = {
            let mut state = self.inner.state.lock().await;
            let before = state.tasks.len();
            state
                .tasks
                .retain(|_, record| !(record.status.is_terminal() && record.last_update_at < cutoff));
            before - state.tasks.len()
        };
        if removed > 0 {
            tracing::info!(removed, "swept expired task records");
            self.checkpoint().await;
        }
        removed
    }

    /// Stop every background poller. Task records stay in place.
    pub async fn shutdown(&self) {
        let mut pollers = self.inner.pollers.lock().await;
        for (_, token) in pollers.drain() {
            token.cancel();
        }
    }

    async fn apply_update(&self, task_id: &str, update: TaskUpdate) -> Result<TaskStatus> {
        let mut state = self.inner.state.lock().await;
        let record = get_task_mut(&mut state.tasks, task_id)?;
        let previous = record.status;
        let next = step_toward(previous, remote_to_local(update.state));

        record.status = next;
        record.consecutive_failures = 0;
        record.last_update_at = Utc::now();
        let conversation_id = record.conversation_id.clone();

        // Consolidate each poll's output into a single injection. A terminal
        // transition with no output still gets exactly one notice.
        let injection = if !update.messages.is_empty() {
            Some(format!(
                "Task update [{task_id}]: {}",
                update.messages.join("\n")
            ))
        } else if next.is_terminal() && !previous.is_terminal() {
            Some(format!("Task update [{task_id}]: task {next}"))
        } else if next == TaskStatus::WaitingForInput && previous != TaskStatus::WaitingForInput {
            Some(format!(
                "Task update [{task_id}]: task is waiting for input"
            ))
        } else {
            None
        };
        if let Some(text) = injection {
            state
                .pending
                .entry(conversation_id)
                .or_default()
                .push(Message::system(text));
        }
        drop(state);

        if next != previous {
            tracing::info!(task_id, from = %previous, to = %next, "task state changed");
        }
        if next.is_terminal() {
            self.stop_poller(task_id).await;
        }
        self.checkpoint().await;
        Ok(next)
    }

    async fn record_poll_failure(&self, task_id: &str, err: PalaverError) -> Result<TaskStatus> {
        let mut state = self.inner.state.lock().await;
        let max = self.inner.config.max_poll_failures;
        let record = get_task_mut(&mut state.tasks, task_id)?;
        record.consecutive_failures += 1;
        record.last_update_at = Utc::now();
        let failures = record.consecutive_failures;
        let conversation_id = record.conversation_id.clone();

        if failures >= max {
            record.status = TaskStatus::Failed;
            state.pending.entry(conversation_id).or_default().push(Message::system(format!(
                "Task update [{task_id}]: task failed after {failures} consecutive poll failures ({err})"
            )));
            drop(state);
            tracing::warn!(task_id, failures, error = %err, "task marked failed");
            self.stop_poller(task_id).await;
            self.checkpoint().await;
            return Ok(TaskStatus::Failed);
        }
        drop(state);
        tracing::debug!(task_id, failures, max, error = %err, "poll failed");
        self.checkpoint().await;
        Err(PalaverError::TaskPoll(format!(
            "poll {failures}/{max} for task {task_id} failed: {err}"
        )))
    }

    /// Spawn the background poll loop for one task. Transient poll errors
    /// back off exponentially, doubling the delay up to eight intervals;
    /// any successful poll resets it.
    async fn spawn_poller(&self, task_id: String) {
        let token = CancellationToken::new();
        {
            let mut pollers = self.inner.pollers.lock().await;
            if let Some(previous) = pollers.insert(task_id.clone(), token.clone()) {
                previous.cancel();
            }
        }
        let bridge = self.clone();
        let interval = self.inner.config.poll_interval;
        let max_delay = interval * 8;
        tokio::spawn(async move {
            let mut delay = interval;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {
                        match bridge.poll_once(&task_id).await {
                            Ok(status) if status.is_terminal() => break,
                            Ok(_) => delay = interval,
                            Err(PalaverError::NotFound(_)) => break,
                            Err(_) => delay = (delay * 2).min(max_delay),
                        }
                    }
                }
            }
        });
    }

    async fn stop_poller(&self, task_id: &str) {
        let mut pollers = self.inner.pollers.lock().await;
        if let Some(token) = pollers.remove(task_id) {
            token.cancel();
        }
    }

    /// Write bridge state to the checkpoint file, if one is configured.
    /// Checkpoint failures are logged, never propagated. Writes are
    /// serialized; the snapshot is taken under the write lock so the last
    /// rename always carries the newest state.
    async fn checkpoint(&self) {
        let Some(path) = self.inner.config.checkpoint_path.clone() else {
            return;
        };
        let _write_guard = self.inner.checkpoint_lock.lock().await;
        let serialized = {
            let state = self.inner.state.lock().await;
            serde_json::to_string_pretty(&*state)
        };
        let serialized = match serialized {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::error!(error = %err, "could not serialize bridge checkpoint");
                return;
            }
        };
        let tmp = path.with_extension("json.tmp");
        let written = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&tmp, serialized.as_bytes()).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(err) = written {
            tracing::error!(path = %path.display(), error = %err, "could not write bridge checkpoint");
        }
    }
}

fn get_task<'a>(tasks: &'a HashMap<String, TaskRecord>, task_id: &str) -> Result<&'a TaskRecord> {
    tasks
        .get(task_id)
        .ok_or_else(|| PalaverError::NotFound(format!("task {task_id}")))
}

fn get_task_mut<'a>(
    tasks: &'a mut HashMap<String, TaskRecord>,
    task_id: &str,
) -> Result<&'a mut TaskRecord> {
    tasks
        .get_mut(task_id)
        .ok_or_else(|| PalaverError::NotFound(format!("task {task_id}")))
}

fn remote_to_local(state: RemoteTaskState) -> TaskStatus {
    match state {
        RemoteTaskState::Running => TaskStatus::Running,
        RemoteTaskState::WaitingForInput => TaskStatus::WaitingForInput,
        RemoteTaskState::Completed => TaskStatus::Completed,
        RemoteTaskState::Failed => TaskStatus::Failed,
    }
}

/// Advance the local state toward what the remote reported, respecting the
/// state machine. Terminal states are absorbing; a waiting task reaches a
/// remote-reported terminal state by passing through running within the
/// same poll.
fn step_toward(current: TaskStatus, reported: TaskStatus) -> TaskStatus {
    if current.is_terminal() {
        current
    } else {
        reported
    }
}
