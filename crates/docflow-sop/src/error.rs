use thiserror::Error;

pub type SopResult<T> = Result<T, SopError>;

#[derive(Debug, Error)]
pub enum SopError {
    #[error("SOP document not found: {0}")]
    NotFound(String),

    #[error("io error reading SOP document: {0}")]
    Io(#[from] std::io::Error),

    #[error("{doc_id}: missing YAML front matter (expected a leading `---` fence)")]
    MissingFrontMatter { doc_id: String },

    #[error("{doc_id}: invalid YAML front matter: {source}")]
    InvalidFrontMatter { doc_id: String, source: serde_yaml::Error },

    #[error("{doc_id}: missing required `tool` mapping")]
    MissingTool { doc_id: String },

    #[error("{doc_id}: `tool.tool_id` is required")]
    MissingToolId { doc_id: String },
}
