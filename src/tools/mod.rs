//! Tool registry and invocation dispatch.

pub mod arguments;
pub mod dispatch;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dispatch::{DispatchOutcome, Dispatcher, ToolRequest};
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolContext, ToolKind, ToolOutcome};
pub use types::ToolParameters;
