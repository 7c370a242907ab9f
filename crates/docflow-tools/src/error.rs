use thiserror::Error;

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool id: {0}")]
    UnknownTool(String),

    #[error("http error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned a non-JSON body")]
    NonJsonResponse { endpoint: String },

    #[error("{endpoint} returned status {status}: {body}")]
    BadStatus { endpoint: String, status: u16, body: String },

    #[error("sandbox reported execution error: {0}")]
    SandboxExecutionError(String),

    #[error("LLM returned a tool call named '{actual}', expected '{expected}'")]
    UnexpectedToolCall { expected: String, actual: String },

    #[error("LLM produced no usable tool call and the XML fallback also failed: {0}")]
    NoToolCall(String),

    #[error("validator rejected LLM output after exhausting retry strategies: {0}")]
    ValidationExhausted(String),
}
