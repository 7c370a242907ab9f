use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("requested path escapes the job sandbox workdir: {0}")]
    PathTraversal(String),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("remote sandbox request failed: {0}")]
    Sandbox(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
