//! Core data model shared by every docflow crate: the workspace `Context`,
//! `PendingTask`/`Task`, engine configuration, and JSON-path helpers.
//!
//! Mirrors `skilllite_core`'s role in the teacher workspace: small, almost
//! dependency-free, imported by everything else.

pub mod config;
pub mod context;
pub mod error;
pub mod jsonpath;
pub mod observability;
pub mod task;

pub use context::Context;
pub use error::{EngineError, EngineResult};
pub use task::{PendingTask, Task, TaskId, TaskState};
