use thiserror::Error;

pub type ResolverResult<T> = Result<T, ResolverError>;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("sop corpus error: {0}")]
    Sop(#[from] docflow_sop::SopError),

    #[error("llm error during resolution: {0}")]
    Tool(#[from] docflow_tools::ToolError),

    #[error("tool-selection LLM returned a tool call named '{0}', expected 'select_tool_for_task'")]
    UnexpectedToolSelectionCall(String),

    #[error("tool-selection LLM selected '{0}', which is outside the constrained enum")]
    SelectedDocOutsideEnum(String),

    #[error("io error reading embedding cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error in embedding cache: {0}")]
    Json(#[from] serde_json::Error),
}
