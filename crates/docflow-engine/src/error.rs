use thiserror::Error;

pub type EngineRunResult<T> = Result<T, EngineRunError>;

#[derive(Debug, Error)]
pub enum EngineRunError {
    #[error(transparent)]
    Core(#[from] docflow_core::error::EngineError),

    #[error(transparent)]
    Sop(#[from] docflow_sop::SopError),

    #[error(transparent)]
    Resolver(#[from] docflow_resolver::ResolverError),

    #[error(transparent)]
    Pathgen(#[from] docflow_pathgen::PathgenError),

    #[error(transparent)]
    Tool(#[from] docflow_tools::ToolError),

    #[error(transparent)]
    Trace(#[from] docflow_trace::TraceError),

    #[error("task retries exhausted for field '{field}': {description}")]
    TaskCreationExhausted { field: String, description: String },
}
