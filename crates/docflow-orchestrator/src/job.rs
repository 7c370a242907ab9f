//! Job record and lifecycle (spec.md §3 `Job`, §4.8):
//! `QUEUED -> STARTING -> RUNNING -> (COMPLETED | FAILED | CANCELLED)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, JobStatus::Starting | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Persisted as `status.json` under `jobs/<job_id>/` (spec.md §6.1), rewritten
/// atomically on every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub task_description: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub trace_files: Vec<String>,
    pub pid: Option<u32>,
    pub max_tasks: usize,
    pub error: Option<JobError>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub sandbox_url: Option<String>,
    pub sandbox_session_id: Option<String>,
    pub sandbox_log_path: Option<String>,
}

impl Job {
    pub fn new(
        job_id: impl Into<String>,
        task_description: impl Into<String>,
        max_tasks: usize,
        env_vars: HashMap<String, String>,
        sandbox_url: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_description: task_description.into(),
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            trace_files: Vec::new(),
            pid: None,
            max_tasks,
            error: None,
            env_vars,
            sandbox_url,
            sandbox_session_id: None,
            sandbox_log_path: None,
        }
    }
}

/// A fresh 16-hex-digit job id, mirroring the teacher's `uuid4().hex[:16]`.
pub fn new_job_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    simple[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_id_is_16_hex_chars() {
        let id = new_job_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn queued_and_starting_are_cancellable_running_states_only() {
        assert!(!JobStatus::Queued.is_cancellable());
        assert!(JobStatus::Starting.is_cancellable());
        assert!(JobStatus::Running.is_cancellable());
        assert!(!JobStatus::Completed.is_cancellable());
    }

    #[test]
    fn terminal_states_match_spec() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
