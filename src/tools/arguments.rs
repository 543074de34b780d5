//! Parsed tool arguments with typed accessors.

use crate::error::{PalaverError, Result};

/// Arguments passed to a tool invocation.
///
/// Models sometimes emit the argument object as a JSON string; the
/// constructor coerces that case so tools only ever see structured values.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) => {
                serde_json::from_str(raw.trim()).unwrap_or(serde_json::Value::String(raw))
            }
            other => other,
        };
        Self { value }
    }

    /// The raw argument value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Look up a field by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.value.get(key)
    }

    /// Look up a string field by key.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Look up an integer field by key.
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.value.get(key).and_then(|v| v.as_i64())
    }

    /// Look up a required string field by key.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.str(key).ok_or_else(|| {
            PalaverError::InvalidArgument(format!("missing required string argument {key:?}"))
        })
    }
}
