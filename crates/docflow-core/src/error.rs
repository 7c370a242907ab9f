//! Engine-facing error taxonomy (spec.md §7).
//!
//! Each variant corresponds to one entry in the error taxonomy: only
//! [`EngineError::TaskInputMissing`] is recoverable by the engine's retry
//! loop; every other variant aborts the session.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The path generator could not extract a required input field from
    /// context. Recoverable: the engine pushes a recovery task ahead of
    /// the original, bounded by `max_retries`.
    #[error("input '{field}' missing: {description}")]
    TaskInputMissing { field: String, description: String },

    /// A task exhausted its recovery retries while still missing inputs.
    #[error("task creation failed after {retries} retries: {source}")]
    TaskCreation {
        retries: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// The resolver returned no usable `doc_id` and no fallback applied.
    #[error("could not resolve an SOP document for task: {description}")]
    UnresolvableSop { description: String },

    /// A task references a tool id absent from the registry.
    #[error("unknown tool id: {0}")]
    UnknownTool(String),

    /// A bound `input_json_path` did not resolve against context.
    #[error("input path '{path}' for field '{field}' did not resolve in context")]
    InputPathUnresolved { field: String, path: String },

    /// Tool execution itself failed (subprocess, sandbox HTTP, etc.).
    #[error("tool '{tool_id}' execution failed: {message}")]
    ToolExecution { tool_id: String, message: String },

    /// LLM validator chain exhausted all retry strategies.
    #[error("LLM validation failed after exhausting retry strategies: {0}")]
    LlmValidation(String),

    /// SOP document failed to load or parse.
    #[error("SOP document error: {0}")]
    SopDocument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Only `TaskInputMissing` is handled by the engine's bounded-retry
    /// recovery loop; everything else aborts the session (spec.md §7).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::TaskInputMissing { .. })
    }
}
