use thiserror::Error;

pub type TraceResult<T> = Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error writing trace file: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error encoding trace: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no open task execution record to attach a phase to")]
    NoOpenTask,

    #[error("no open phase to attach a sub-step to")]
    NoOpenPhase,
}
