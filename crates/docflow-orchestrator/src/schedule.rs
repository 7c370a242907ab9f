//! Schedule storage (spec.md §4.9): durable `(spec.json, status.json)`
//! pairs under `schedules/<schedule_id>/`, grounded verbatim on
//! `schedule_models.py`/`schedule_storage.py`. Storage-only: no cron
//! scheduler loop runs here, matching the original's own scope.

use crate::error::{OrchestratorError, OrchestratorResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJobTemplate {
    pub task_description: String,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub sandbox_url: Option<String>,
}

fn default_max_tasks() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJobSpec {
    pub schedule_id: String,
    pub name: String,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub suspend: bool,
    pub job_template: ScheduledJobTemplate,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ScheduledJobSpec {
    pub fn validate_basic(&self) -> OrchestratorResult<()> {
        if self.schedule_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidSchedule("schedule_id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::InvalidSchedule("name is required".to_string()));
        }
        if self.cron.trim().is_empty() {
            return Err(OrchestratorError::InvalidSchedule("cron is required".to_string()));
        }
        if self.timezone.trim().is_empty() {
            return Err(OrchestratorError::InvalidSchedule("timezone is required".to_string()));
        }
        if self.job_template.task_description.trim().is_empty() {
            return Err(OrchestratorError::InvalidSchedule("job_template.task_description is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledJobStatus {
    pub last_job_id: Option<String>,
    pub last_scheduled_for: Option<DateTime<Utc>>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub next_scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScheduleStore {
    schedules_dir: PathBuf,
}

impl ScheduleStore {
    pub fn new(schedules_dir: impl Into<PathBuf>) -> Self {
        Self { schedules_dir: schedules_dir.into() }
    }

    fn schedule_dir(&self, schedule_id: &str) -> OrchestratorResult<PathBuf> {
        let normalized = schedule_id.trim();
        if normalized.is_empty() {
            return Err(OrchestratorError::InvalidSchedule("schedule_id is required".to_string()));
        }
        Ok(self.schedules_dir.join(normalized))
    }

    fn spec_path(&self, schedule_id: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.schedule_dir(schedule_id)?.join("spec.json"))
    }

    fn status_path(&self, schedule_id: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.schedule_dir(schedule_id)?.join("status.json"))
    }

    pub async fn list_schedule_ids(&self) -> OrchestratorResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match fs::read_dir(&self.schedules_dir).await {
            Ok(e) => e,
            Err(_) => return Ok(ids),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn load_spec(&self, schedule_id: &str) -> OrchestratorResult<ScheduledJobSpec> {
        let path = self.spec_path(schedule_id)?;
        let bytes = fs::read(&path).await.map_err(|_| OrchestratorError::ScheduleNotFound(schedule_id.to_string()))?;
        let spec: ScheduledJobSpec = serde_json::from_slice(&bytes)?;
        spec.validate_basic()?;
        Ok(spec)
    }

    pub async fn load_status(&self, schedule_id: &str) -> OrchestratorResult<ScheduledJobStatus> {
        let path = self.status_path(schedule_id)?;
        let bytes = fs::read(&path).await.map_err(|_| OrchestratorError::ScheduleNotFound(schedule_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn load_status_if_present(&self, schedule_id: &str) -> OrchestratorResult<Option<ScheduledJobStatus>> {
        let path = self.status_path(schedule_id)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.load_status(schedule_id).await?))
    }

    pub async fn save_spec(&self, spec: &ScheduledJobSpec) -> OrchestratorResult<()> {
        spec.validate_basic()?;
        let path = self.spec_path(&spec.schedule_id)?;
        atomic_write_json(&path, spec).await
    }

    pub async fn save_status(&self, schedule_id: &str, status: &ScheduledJobStatus) -> OrchestratorResult<()> {
        let path = self.status_path(schedule_id)?;
        atomic_write_json(&path, status).await
    }
}

async fn atomic_write_json<T: Serialize>(path: &Path, payload: &T) -> OrchestratorResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_file_name(format!(".{}.tmp", path.file_name().and_then(|f| f.to_str()).unwrap_or("schedule")));
    fs::write(&tmp, serde_json::to_vec_pretty(payload)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec(id: &str) -> ScheduledJobSpec {
        ScheduledJobSpec {
            schedule_id: id.to_string(),
            name: "nightly summary".to_string(),
            cron: "0 2 * * *".to_string(),
            timezone: "UTC".to_string(),
            suspend: false,
            job_template: ScheduledJobTemplate {
                task_description: "summarize yesterday's logs".to_string(),
                max_tasks: 20,
                env_vars: HashMap::new(),
                sandbox_url: None,
            },
        }
    }

    #[tokio::test]
    async fn save_and_load_spec_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        let spec = sample_spec("sched-1");
        store.save_spec(&spec).await.unwrap();

        let loaded = store.load_spec("sched-1").await.unwrap();
        assert_eq!(loaded.name, "nightly summary");
        assert_eq!(loaded.cron, "0 2 * * *");
    }

    #[tokio::test]
    async fn validate_basic_rejects_empty_cron() {
        let mut spec = sample_spec("sched-2");
        spec.cron = "".to_string();
        let err = spec.validate_basic().unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidSchedule(_)));
    }

    #[tokio::test]
    async fn load_status_if_present_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        assert!(store.load_status_if_present("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_schedule_ids_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        store.save_spec(&sample_spec("zzz")).await.unwrap();
        store.save_spec(&sample_spec("aaa")).await.unwrap();

        let ids = store.list_schedule_ids().await.unwrap();
        assert_eq!(ids, vec!["aaa".to_string(), "zzz".to_string()]);
    }
}
