//! Palaver is the conversation core for an agentic assistant: ordered
//! message histories with tool-call pairing invariants, file-backed
//! persistence, a tool invocation dispatcher, a bridge for long-running
//! remote tasks, and the session engine that drives one user turn through
//! model calls and tool rounds.
//!
//! The model itself sits behind [`backend::ModelBackend`]; palaver never
//! speaks a vendor wire format.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use palaver::prelude::*;
//!
//! # async fn run(backend: Arc<dyn ModelBackend>) -> palaver::Result<()> {
//! let store = Arc::new(FileHistoryStore::new("/var/lib/palaver")?);
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(FnTool::new(
//!     "echo",
//!     "echoes text back",
//!     ToolParameters::object().string("text", "text to echo", true).build(),
//!     |args, _ctx| async move { Ok(serde_json::json!(args.require_str("text")?)) },
//! )));
//!
//! let engine = SessionEngine::new(backend, store, Arc::new(registry));
//! let outcome = engine.run_turn("conv-1", "say hi").await?;
//! println!("{}", outcome.reply);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod prelude;
pub mod protocol;
pub mod tools;
pub mod types;
pub mod validate;

pub use error::{PalaverError, Result};
