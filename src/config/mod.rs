//! TOML configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeConfig;
use crate::error::{PalaverError, Result};

/// Top-level configuration, loaded from `palaver.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PalaverConfig {
    pub history: HistorySection,
    pub bridge: BridgeSection,
    pub engine: EngineSection,
    /// Task servers by name, value is a `host:port` address.
    pub servers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Root directory for conversation files. Defaults to the platform
    /// data directory.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub poll_interval_secs: u64,
    pub max_poll_failures: u32,
    pub retention_secs: u64,
    /// Checkpoint file path. Defaults to `tasks.json` under the data
    /// directory; set to an empty string to disable checkpointing.
    pub checkpoint: Option<PathBuf>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_poll_failures: 3,
            retention_secs: 24 * 60 * 60,
            checkpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Tool rounds allowed within one turn before the run is aborted.
    pub max_tool_rounds: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { max_tool_rounds: 32 }
    }
}

impl PalaverConfig {
    /// Parse configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
            .map_err(|err| PalaverError::Configuration(format!("{}: {err}", path.display())))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load from the platform config directory, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self> {
        let Some(dirs) = project_dirs() else {
            return Ok(Self::default());
        };
        let path = dirs.config_dir().join("palaver.toml");
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Root directory for conversation history files.
    pub fn history_root(&self) -> PathBuf {
        self.history
            .root
            .clone()
            .unwrap_or_else(|| data_dir().join("history"))
    }

    /// Bridge tuning derived from the `[bridge]` section.
    pub fn bridge_config(&self) -> BridgeConfig {
        let checkpoint_path = match &self.bridge.checkpoint {
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => Some(path.clone()),
            None => Some(data_dir().join("tasks.json")),
        };
        BridgeConfig {
            poll_interval: Duration::from_secs(self.bridge.poll_interval_secs),
            max_poll_failures: self.bridge.max_poll_failures,
            retention: Duration::from_secs(self.bridge.retention_secs),
            checkpoint_path,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "palaver")
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".palaver"))
}
