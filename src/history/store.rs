//! File-backed persistence for conversation histories.
//!
//! One JSON array of messages per conversation id. Loads always pass through
//! the structure validator: persisted records are untrusted input and may
//! predate the current invariants.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{PalaverError, Result};
use crate::history::Conversation;
use crate::types::Message;
use crate::validate;

/// Persistence boundary for conversation histories.
///
/// Single-writer per conversation: the session engine owns exclusive access
/// for the duration of a turn. Concurrent writers to the same conversation
/// are unsupported and must be excluded by a higher-level lock.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load a conversation, validating its messages.
    ///
    /// # Errors
    ///
    /// Returns [`PalaverError::NotFound`] if no record exists for the id.
    async fn load(&self, conversation_id: &str) -> Result<Conversation>;

    /// Durably append messages to a conversation. Atomic: either every
    /// message in the batch is recorded or none are.
    async fn append(&self, conversation_id: &str, messages: &[Message]) -> Result<()>;

    /// List all persisted conversation ids.
    async fn list(&self) -> Result<Vec<String>>;

    /// Delete a conversation's persisted record.
    async fn delete(&self, conversation_id: &str) -> Result<()>;
}

/// Stores each conversation as `<root>/conversations/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    conversations_dir: PathBuf,
}

impl FileHistoryStore {
    /// Create a store rooted at `root`, creating directories as needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let conversations_dir = root.as_ref().join("conversations");
        std::fs::create_dir_all(&conversations_dir)?;
        Ok(Self { conversations_dir })
    }

    fn path_for(&self, conversation_id: &str) -> Result<PathBuf> {
        if conversation_id.is_empty()
            || conversation_id.contains(['/', '\\'])
            || conversation_id == "."
            || conversation_id == ".."
        {
            return Err(PalaverError::InvalidArgument(format!(
                "conversation id not usable as a file name: {conversation_id:?}"
            )));
        }
        Ok(self.conversations_dir.join(format!("{conversation_id}.json")))
    }

    /// Read the raw persisted records, skipping entries that no longer
    /// deserialize (forward compatibility: repair, never reject).
    async fn read_raw(&self, path: &Path, conversation_id: &str) -> Result<Vec<Message>> {
        let bytes = fs::read(path).await?;
        let records: Vec<serde_json::Value> = match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(
                    conversation_id,
                    error = %err,
                    "conversation file unreadable; starting from empty history"
                );
                return Ok(Vec::new());
            }
        };

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<Message>(record) {
                Ok(message) => messages.push(message),
                Err(err) => {
                    tracing::warn!(conversation_id, error = %err, "skipping unreadable message record");
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self, conversation_id: &str) -> Result<Conversation> {
        let path = self.path_for(conversation_id)?;
        if !fs::try_exists(&path).await? {
            return Err(PalaverError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }

        let raw = self.read_raw(&path, conversation_id).await?;
        let (validated, report) = validate::validate_report(&raw);
        if !report.is_clean() {
            tracing::warn!(
                conversation_id,
                dropped = report.dropped(),
                duplicates = report.dropped_duplicates,
                orphans = report.dropped_orphan_tools,
                "repaired persisted history on load"
            );
        }
        Ok(Conversation::from_messages(conversation_id, validated))
    }

    async fn append(&self, conversation_id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let path = self.path_for(conversation_id)?;

        let mut all = if fs::try_exists(&path).await? {
            self.read_raw(&path, conversation_id).await?
        } else {
            Vec::new()
        };
        all.extend_from_slice(messages);

        // Write-then-rename keeps the batch atomic on the same filesystem.
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(&all)?;
        fs::write(&tmp, payload).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(conversation_id, appended = messages.len(), total = all.len(), "history append");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.conversations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, conversation_id: &str) -> Result<()> {
        let path = self.path_for(conversation_id)?;
        if !fs::try_exists(&path).await? {
            return Err(PalaverError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }
        fs::remove_file(&path).await?;
        Ok(())
    }
}
