//! Error types for palaver.

use thiserror::Error;

/// Primary error type for all palaver operations.
#[derive(Error, Debug)]
pub enum PalaverError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("task poll error: {0}")]
    TaskPoll(String),

    #[error("tool-call depth exceeded after {0} rounds")]
    DepthExceeded(usize),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    State,
    Argument,
    Tool,
    Poll,
    Depth,
    Protocol,
    Configuration,
    Backend,
    Io,
    Serialization,
}

impl PalaverError {
    /// Convenience constructor for tool execution failures.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::InvalidState(_) => ErrorCategory::State,
            Self::InvalidArgument(_) => ErrorCategory::Argument,
            Self::ToolExecution { .. } => ErrorCategory::Tool,
            Self::TaskPoll(_) => ErrorCategory::Poll,
            Self::DepthExceeded(_) => ErrorCategory::Depth,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Backend(_) => ErrorCategory::Backend,
            Self::Io(_) => ErrorCategory::Io,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Poll and protocol failures are transient by contract; everything else
    /// either needs caller intervention or is a permanent condition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Poll | ErrorCategory::Protocol | ErrorCategory::Io
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PalaverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_constructor_fills_fields() {
        let err = PalaverError::tool("echo", "exit 1");
        assert!(matches!(
            err,
            PalaverError::ToolExecution { tool_name, message }
            if tool_name == "echo" && message == "exit 1"
        ));
    }

    #[test]
    fn poll_errors_are_retryable() {
        assert!(PalaverError::TaskPoll("timeout".into()).is_retryable());
        assert!(!PalaverError::DepthExceeded(32).is_retryable());
        assert!(!PalaverError::NotFound("conv-1".into()).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = PalaverError::DepthExceeded(50);
        assert!(err.to_string().contains("50"));
    }
}
