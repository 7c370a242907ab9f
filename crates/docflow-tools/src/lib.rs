//! Tool contract (spec.md §4.7), LLM client (grounded on
//! `skilllite_agent::llm`), and concrete tool implementations.

pub mod error;
pub mod llm;
pub mod retry;
pub mod tool;
pub mod tools;
pub mod traced;

pub use error::{ToolError, ToolResult};
pub use tool::{Tool, ToolCallArgs};
pub use traced::{LlmCallRecord, ToolCallRecord, TracedTool, TraceSink};
