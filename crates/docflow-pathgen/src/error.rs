use docflow_core::error::EngineError;
use thiserror::Error;

pub type PathgenResult<T> = Result<T, PathgenError>;

#[derive(Debug, Error)]
pub enum PathgenError {
    #[error("input '{field}' missing: {description}")]
    InputMissing { field: String, description: String },

    #[error("llm tool error during path generation: {0}")]
    Tool(#[from] docflow_tools::ToolError),

    #[error("LLM produced no usable candidate/extraction/output-path response: {0}")]
    MalformedLlmResponse(String),
}

impl From<PathgenError> for EngineError {
    fn from(err: PathgenError) -> Self {
        match err {
            PathgenError::InputMissing { field, description } => EngineError::TaskInputMissing { field, description },
            other => EngineError::SopDocument(other.to_string()),
        }
    }
}
