//! `ExecutionManager` (spec.md §4.8): accepts, persists, schedules,
//! supervises, and introspects Job executions, grounded on
//! `orchestrator_service.manager.ExecutionManager`'s subprocess-per-job
//! design, generalized from its Python-specific `asyncio.Task` bookkeeping
//! to `tokio::spawn` + a counting semaphore.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::{Job, JobError, JobStatus};
use crate::sandbox_client::SandboxClient;
use bytes::Bytes;
use chrono::Utc;
use docflow_core::config::loader::env_or;
use docflow_core::config::{env_keys, OrchestratorConfig, PathsConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};

#[derive(Clone)]
pub struct ExecutionManager {
    jobs_dir: PathBuf,
    traces_dir: PathBuf,
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    semaphore: Arc<Semaphore>,
    sandbox: Option<SandboxClient>,
}

pub enum SandboxFileResolution {
    Local { path: PathBuf, filename: String },
    Remote { remote_path: String, filename: String },
}

impl ExecutionManager {
    pub async fn new(paths: &PathsConfig, config: &OrchestratorConfig) -> OrchestratorResult<Self> {
        fs::create_dir_all(&paths.jobs_dir).await?;
        fs::create_dir_all(&paths.trace_dir).await?;
        let manager = Self {
            jobs_dir: paths.jobs_dir.clone(),
            traces_dir: paths.trace_dir.clone(),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(config.max_parallel_jobs.max(1))),
            sandbox: config.sandbox_base_url.clone().map(SandboxClient::new),
        };
        manager.load_existing_jobs().await?;
        Ok(manager)
    }

    /// Cold-start reconciliation: a prior `RUNNING` job whose pid is no
    /// longer alive is marked `FAILED` with a synthetic error.
    async fn load_existing_jobs(&self) -> OrchestratorResult<()> {
        let mut entries = match fs::read_dir(&self.jobs_dir).await {
            Ok(e) => e,
            Err(_) => return Ok(()),
        };
        let mut jobs = self.jobs.lock().await;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let status_path = entry.path().join("status.json");
            let Ok(bytes) = fs::read(&status_path).await else { continue };
            let Ok(mut job): Result<Job, _> = serde_json::from_slice(&bytes) else { continue };
            if job.status == JobStatus::Running {
                let alive = job.pid.map(process_is_alive).unwrap_or(false);
                if !alive {
                    job.status = JobStatus::Failed;
                    job.finished_at = Some(Utc::now());
                    job.error = Some(JobError { message: "process terminated unexpectedly".to_string(), exit_code: None });
                    let _ = persist_status(&self.jobs_dir, &job).await;
                }
            }
            jobs.insert(job.job_id.clone(), job);
        }
        Ok(())
    }

    pub async fn create_job(
        &self,
        task_description: String,
        max_tasks: Option<usize>,
        env_vars: Option<HashMap<String, String>>,
        sandbox_url: Option<String>,
    ) -> OrchestratorResult<Job> {
        let job_id = crate::job::new_job_id();
        let mut env = env_vars.unwrap_or_default();
        env.insert("DOCFLOW_JOB_ID".to_string(), job_id.clone());
        let job = Job::new(job_id.clone(), task_description.clone(), max_tasks.unwrap_or(50), env, sandbox_url);

        let job_dir = self.jobs_dir.join(&job_id);
        fs::create_dir_all(&job_dir).await?;
        fs::write(job_dir.join(format!("{job_id}.task")), &task_description).await?;
        fs::write(job_dir.join("env.json"), serde_json::to_vec_pretty(&job.env_vars)?).await?;
        let request = serde_json::json!({
            "task_description": task_description,
            "max_tasks": job.max_tasks,
            "created_at": job.created_at.to_rfc3339(),
        });
        fs::write(job_dir.join("request.json"), serde_json::to_vec_pretty(&request)?).await?;

        self.jobs.lock().await.insert(job_id.clone(), job.clone());
        persist_status(&self.jobs_dir, &job).await?;

        let manager = self.clone();
        let launch_id = job_id.clone();
        tokio::spawn(async move {
            manager.launch_job(launch_id).await;
        });

        Ok(job)
    }

    async fn launch_job(&self, job_id: String) {
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return;
        };
        if let Err(err) = self.execute_job(&job_id).await {
            tracing::error!(job_id, error = %err, "job failed to start");
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(&job_id) {
                job.status = JobStatus::Failed;
                job.finished_at = Some(Utc::now());
                job.error = Some(JobError { message: err.to_string(), exit_code: None });
                let _ = persist_status(&self.jobs_dir, job).await;
            }
        }
    }

    async fn execute_job(&self, job_id: &str) -> OrchestratorResult<()> {
        {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
            job.status = JobStatus::Starting;
            job.started_at = Some(Utc::now());
            persist_status(&self.jobs_dir, job).await?;
        }

        let trace_filename = format!("session_{}_{}.json", Utc::now().format("%Y%m%d_%H%M%S"), &job_id[..8.min(job_id.len())]);
        let trace_path = self.traces_dir.join(&trace_filename);
        if let Some(parent) = trace_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&trace_path, b"").await?;

        let (max_tasks, sandbox_url) = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
            if !job.trace_files.contains(&trace_filename) {
                job.trace_files.push(trace_filename.clone());
            }
            persist_status(&self.jobs_dir, job).await?;
            (job.max_tasks, job.sandbox_url.clone())
        };

        let job_dir = self.jobs_dir.join(job_id);
        let task_path = job_dir.join(format!("{job_id}.task"));
        let env_path = job_dir.join("env.json");
        let context_path = job_dir.join("context.json");

        match (sandbox_url, self.sandbox.clone()) {
            (Some(base_url), Some(_)) => {
                self.execute_sandbox_job(job_id, &base_url, max_tasks, &trace_filename, &task_path, &env_path, &context_path)
                    .await
            }
            _ => self.execute_local_job(job_id, max_tasks, &trace_filename, &task_path, &env_path, &context_path).await,
        }
    }

    fn runner_command(
        job_id: &str,
        max_tasks: usize,
        trace_filename: &str,
        task_path: &Path,
        env_path: &Path,
        context_path: &Path,
    ) -> OrchestratorResult<Vec<String>> {
        let runner_bin = env_or(env_keys::orchestrator::RUNNER_BIN)
            .or_else(|| std::env::current_exe().ok().and_then(|p| p.to_str().map(str::to_string)))
            .ok_or_else(|| OrchestratorError::Sandbox("could not locate the runner binary".to_string()))?;
        Ok(vec![
            runner_bin,
            "run".to_string(),
            "--job-id".to_string(),
            job_id.to_string(),
            "--task-file".to_string(),
            task_path.to_string_lossy().into_owned(),
            "--max-tasks".to_string(),
            max_tasks.to_string(),
            "--trace-file".to_string(),
            trace_filename.to_string(),
            "--context-file".to_string(),
            context_path.to_string_lossy().into_owned(),
            "--env-file".to_string(),
            env_path.to_string_lossy().into_owned(),
        ])
    }

    async fn execute_local_job(
        &self,
        job_id: &str,
        max_tasks: usize,
        trace_filename: &str,
        task_path: &Path,
        env_path: &Path,
        context_path: &Path,
    ) -> OrchestratorResult<()> {
        let job_dir = self.jobs_dir.join(job_id);
        let log_path = job_dir.join("engine_stdout.log");
        let log_file = std::fs::File::create(&log_path)?;
        let stderr_file = log_file.try_clone()?;

        let mut command = Self::runner_command(job_id, max_tasks, trace_filename, task_path, env_path, context_path)?.into_iter();
        let program = command.next().expect("runner command always has a program");
        let mut cmd = Command::new(program);
        cmd.args(command).stdout(Stdio::from(log_file)).stderr(Stdio::from(stderr_file));

        let mut child = cmd.spawn()?;
        let pid = child.id();

        {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
            job.pid = pid;
            job.status = JobStatus::Running;
            persist_status(&self.jobs_dir, job).await?;
        }

        let exit_status = child.wait().await?;

        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        // A cancelled job's final status cannot be overwritten by the
        // exit-code handler (spec.md §4.8 invariant).
        if job.status != JobStatus::Cancelled {
            job.finished_at = Some(Utc::now());
            if exit_status.success() {
                job.status = JobStatus::Completed;
            } else {
                job.status = JobStatus::Failed;
                job.error = Some(JobError { message: format!("runner exited with {exit_status}"), exit_code: exit_status.code() });
            }
            persist_status(&self.jobs_dir, job).await?;
        }
        tracing::info!(job_id, status = ?job.status, "job finished");
        Ok(())
    }

    async fn execute_sandbox_job(
        &self,
        job_id: &str,
        base_url: &str,
        max_tasks: usize,
        trace_filename: &str,
        task_path: &Path,
        env_path: &Path,
        context_path: &Path,
    ) -> OrchestratorResult<()> {
        let client = SandboxClient::new(base_url);
        let command = Self::runner_command(job_id, max_tasks, trace_filename, task_path, env_path, context_path)?;
        let env = fs::read(env_path).await.ok().and_then(|b| serde_json::from_slice::<HashMap<String, String>>(&b).ok()).unwrap_or_default();

        let session = client
            .create_session(&command, &env)
            .await
            .map_err(|e| OrchestratorError::Sandbox(e.to_string()))?;

        {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
            job.sandbox_session_id = Some(session.session_id);
            job.sandbox_log_path = Some(session.log_path);
            job.status = JobStatus::Running;
            persist_status(&self.jobs_dir, job).await?;
        }

        // Remote execution is fire-and-forget from the manager's point of
        // view: completion is observed via `sync_job_context`/`sync_trace_file`
        // polling rather than a blocking wait, since there is no local
        // child process to await.
        Ok(())
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().await;
        let mut list: Vec<Job> = jobs.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub async fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    pub async fn cancel_job(&self, job_id: &str) -> OrchestratorResult<bool> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        if !job.status.is_cancellable() {
            return Ok(false);
        }
        if let Some(pid) = job.pid {
            if send_sigterm(pid).is_ok() {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
                persist_status(&self.jobs_dir, job).await?;
                return Ok(true);
            }
        }
        if let (Some(client), Some(session_id)) = (&self.sandbox, job.sandbox_session_id.clone()) {
            if client.cancel_session(&session_id).await.is_ok() {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
                persist_status(&self.jobs_dir, job).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn get_job_logs(&self, job_id: &str, tail_lines: Option<usize>) -> OrchestratorResult<Option<String>> {
        let log_path = self.jobs_dir.join(job_id).join("engine_stdout.log");
        if !log_path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&log_path).await?;
        Ok(Some(match tail_lines {
            Some(n) => tail(&contents, n),
            None => contents,
        }))
    }

    /// Pulls `context.json` from the remote sandbox when `force` (or the
    /// job is still running); local jobs are always considered synced
    /// since the engine writes `context.json` directly into `jobs_dir`.
    pub async fn sync_job_context(&self, job_id: &str, force: bool) -> OrchestratorResult<bool> {
        self.sync_remote_file(job_id, force, "context.json", self.jobs_dir.join(job_id).join("context.json")).await
    }

    pub async fn sync_trace_file(&self, trace_filename: &str, job_id: &str, force: bool) -> OrchestratorResult<bool> {
        self.sync_remote_file(job_id, force, trace_filename, self.traces_dir.join(trace_filename)).await
    }

    async fn sync_remote_file(&self, job_id: &str, force: bool, remote_name: &str, dest: PathBuf) -> OrchestratorResult<bool> {
        let job = self.get_job(job_id).await.ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        let (Some(sandbox_url), Some(log_path)) = (&job.sandbox_url, &job.sandbox_log_path) else {
            return Ok(true);
        };
        if !force && job.status.is_terminal() {
            return Ok(true);
        }
        let client = SandboxClient::new(sandbox_url.clone());
        let remote_dir = Path::new(log_path).parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let remote_path = format!("{remote_dir}/{remote_name}");
        let bytes = client.download_file(&remote_path).await.map_err(|e| OrchestratorError::Sandbox(e.to_string()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&dest, &bytes).await?;
        Ok(true)
    }

    /// Decides local vs. remote file serving for `GET /sandbox/{job_id}/{path}`:
    /// rejects path traversal and requires the path to resolve under the
    /// job's workdir (local) or is handed off as-is for remote streaming.
    pub async fn resolve_sandbox_file_request(&self, job_id: &str, requested_path: &str) -> OrchestratorResult<SandboxFileResolution> {
        let job = self.get_job(job_id).await.ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        if requested_path.is_empty() || requested_path.split('/').any(|segment| segment == "..") {
            return Err(OrchestratorError::PathTraversal(requested_path.to_string()));
        }
        let filename = Path::new(requested_path).file_name().and_then(|f| f.to_str()).unwrap_or(requested_path).to_string();

        if let Some(sandbox_url) = &job.sandbox_url {
            let _ = sandbox_url;
            return Ok(SandboxFileResolution::Remote { remote_path: requested_path.to_string(), filename });
        }

        let job_dir = self.jobs_dir.join(job_id);
        let job_dir = job_dir.canonicalize().map_err(|_| OrchestratorError::JobNotFound(job_id.to_string()))?;
        let candidate = job_dir.join(requested_path);
        let canonical = candidate.canonicalize().map_err(|_| OrchestratorError::PathTraversal(requested_path.to_string()))?;
        if !canonical.starts_with(&job_dir) {
            return Err(OrchestratorError::PathTraversal(requested_path.to_string()));
        }
        Ok(SandboxFileResolution::Local { path: canonical, filename })
    }

    pub async fn stream_remote_file(&self, job_id: &str, remote_path: &str) -> OrchestratorResult<Bytes> {
        let job = self.get_job(job_id).await.ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        let sandbox_url = job.sandbox_url.ok_or_else(|| OrchestratorError::Sandbox("job has no sandbox_url".to_string()))?;
        let client = SandboxClient::new(sandbox_url);
        client.download_file(remote_path).await.map_err(|e| OrchestratorError::Sandbox(e.to_string()))
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }
}

fn tail(contents: &str, n: usize) -> String {
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

async fn persist_status(jobs_dir: &Path, job: &Job) -> OrchestratorResult<()> {
    let job_dir = jobs_dir.join(&job.job_id);
    fs::create_dir_all(&job_dir).await?;
    let bytes = serde_json::to_vec_pretty(job)?;
    let tmp = job_dir.join("status.json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, job_dir.join("status.json")).await?;
    Ok(())
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> std::io::Result<()> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::other("job cancellation by pid is not supported on this platform"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_job_persists_request_task_and_env_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig {
            sop_dir: dir.path().join("docs"),
            trace_dir: dir.path().join("traces"),
            jobs_dir: dir.path().join("jobs"),
            cache_dir: dir.path().join("cache"),
        };
        let config = OrchestratorConfig { listen_addr: "127.0.0.1:0".into(), max_parallel_jobs: 1, sandbox_base_url: None };
        let manager = ExecutionManager::new(&paths, &config).await.unwrap();
        let job = manager.create_job("do the thing".to_string(), Some(10), None, None).await.unwrap();

        let job_dir = paths.jobs_dir.join(&job.job_id);
        assert!(job_dir.join("request.json").exists());
        assert!(job_dir.join(format!("{}.task", job.job_id)).exists());
        assert!(job_dir.join("env.json").exists());
        let env_bytes = std::fs::read(job_dir.join("env.json")).unwrap();
        let env: HashMap<String, String> = serde_json::from_slice(&env_bytes).unwrap();
        assert_eq!(env.get("DOCFLOW_JOB_ID"), Some(&job.job_id));
    }

    #[tokio::test]
    async fn list_jobs_orders_by_created_at_descending() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig {
            sop_dir: dir.path().join("docs"),
            trace_dir: dir.path().join("traces"),
            jobs_dir: dir.path().join("jobs"),
            cache_dir: dir.path().join("cache"),
        };
        let config = OrchestratorConfig { listen_addr: "127.0.0.1:0".into(), max_parallel_jobs: 1, sandbox_base_url: None };
        let manager = ExecutionManager::new(&paths, &config).await.unwrap();
        let first = manager.create_job("first".to_string(), None, None, None).await.unwrap();
        let second = manager.create_job("second".to_string(), None, None, None).await.unwrap();

        let jobs = manager.list_jobs().await;
        let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert!(ids.contains(&first.job_id.as_str()));
        assert!(ids.contains(&second.job_id.as_str()));
    }

    #[tokio::test]
    async fn resolve_sandbox_file_request_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig {
            sop_dir: dir.path().join("docs"),
            trace_dir: dir.path().join("traces"),
            jobs_dir: dir.path().join("jobs"),
            cache_dir: dir.path().join("cache"),
        };
        let config = OrchestratorConfig { listen_addr: "127.0.0.1:0".into(), max_parallel_jobs: 1, sandbox_base_url: None };
        let manager = ExecutionManager::new(&paths, &config).await.unwrap();
        let job = manager.create_job("task".to_string(), None, None, None).await.unwrap();

        let err = manager.resolve_sandbox_file_request(&job.job_id, "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PathTraversal(_)));
    }

    #[tokio::test]
    async fn resolve_sandbox_file_request_serves_local_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig {
            sop_dir: dir.path().join("docs"),
            trace_dir: dir.path().join("traces"),
            jobs_dir: dir.path().join("jobs"),
            cache_dir: dir.path().join("cache"),
        };
        let config = OrchestratorConfig { listen_addr: "127.0.0.1:0".into(), max_parallel_jobs: 1, sandbox_base_url: None };
        let manager = ExecutionManager::new(&paths, &config).await.unwrap();
        let job = manager.create_job("task".to_string(), None, None, None).await.unwrap();

        let resolution = manager.resolve_sandbox_file_request(&job.job_id, &format!("{}.task", job.job_id)).await.unwrap();
        match resolution {
            SandboxFileResolution::Local { path, filename } => {
                assert!(path.exists());
                assert_eq!(filename, format!("{}.task", job.job_id));
            }
            SandboxFileResolution::Remote { .. } => panic!("expected local resolution for a job without sandbox_url"),
        }
    }
}
