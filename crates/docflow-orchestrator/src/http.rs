//! HTTP surface (spec.md §6.2), generalized from
//! `skilllite_swarm::handler`'s `AppState`/`Router`/`IntoResponse` idiom
//! from its single `/task`+`/status` pair to the full job-orchestrator API.

use crate::error::OrchestratorError;
use crate::manager::{ExecutionManager, SandboxFileResolution};
use crate::schedule::{ScheduleStore, ScheduledJobSpec, ScheduledJobStatus};
use axum::body::Body;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ExecutionManager>,
    pub schedules: Arc<ScheduleStore>,
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestratorError::JobNotFound(_) | OrchestratorError::ScheduleNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::PathTraversal(_) | OrchestratorError::InvalidSchedule(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::Sandbox(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Io(_) | OrchestratorError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub task_description: String,
    pub max_tasks: Option<usize>,
    #[serde(default)]
    pub env_vars: Option<HashMap<String, String>>,
    pub sandbox_url: Option<String>,
}

async fn create_job(State(state): State<AppState>, Json(req): Json<CreateJobRequest>) -> Response {
    match state
        .manager
        .create_job(req.task_description, req.max_tasks, req.env_vars, req.sandbox_url)
        .await
    {
        Ok(job) => (StatusCode::ACCEPTED, Json(job)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_jobs(State(state): State<AppState>) -> Response {
    Json(state.manager.list_jobs().await).into_response()
}

async fn get_job(State(state): State<AppState>, AxumPath(job_id): AxumPath<String>) -> Response {
    match state.manager.get_job(&job_id).await {
        Some(job) => Json(job).into_response(),
        None => OrchestratorError::JobNotFound(job_id).into_response(),
    }
}

async fn cancel_job(State(state): State<AppState>, AxumPath(job_id): AxumPath<String>) -> Response {
    match state.manager.cancel_job(&job_id).await {
        Ok(true) => Json(serde_json::json!({ "cancelled": true })).into_response(),
        Ok(false) => (StatusCode::CONFLICT, Json(serde_json::json!({ "cancelled": false }))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

async fn get_job_logs(State(state): State<AppState>, AxumPath(job_id): AxumPath<String>, Query(query): Query<LogsQuery>) -> Response {
    match state.manager.get_job_logs(&job_id, query.tail).await {
        Ok(Some(logs)) => logs.into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no logs for this job yet").into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct SyncQuery {
    #[serde(default)]
    pub force: bool,
}

async fn get_job_context(State(state): State<AppState>, AxumPath(job_id): AxumPath<String>, Query(query): Query<SyncQuery>) -> Response {
    if let Err(err) = state.manager.sync_job_context(&job_id, query.force).await {
        return err.into_response();
    }
    let path = state.manager.jobs_dir().join(&job_id).join("context.json");
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([("content-type", "application/json")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "no context available for this job yet").into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct TraceSyncQuery {
    #[serde(default)]
    pub force: bool,
    pub job_id: String,
}

async fn sync_trace(State(state): State<AppState>, AxumPath(trace_id): AxumPath<String>, Query(query): Query<TraceSyncQuery>) -> Response {
    match state.manager.sync_trace_file(&trace_id, &query.job_id, query.force).await {
        Ok(synced) => Json(serde_json::json!({ "synced": synced })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn sandbox_file(State(state): State<AppState>, AxumPath((job_id, path)): AxumPath<(String, String)>) -> Response {
    let resolution = match state.manager.resolve_sandbox_file_request(&job_id, &path).await {
        Ok(r) => r,
        Err(err) => return err.into_response(),
    };
    match resolution {
        SandboxFileResolution::Local { path, filename } => match tokio::fs::read(&path).await {
            Ok(bytes) => (
                [("content-disposition", format!("attachment; filename=\"{filename}\""))],
                bytes,
            )
                .into_response(),
            Err(err) => OrchestratorError::Io(err).into_response(),
        },
        SandboxFileResolution::Remote { remote_path, filename } => match state.manager.stream_remote_file(&job_id, &remote_path).await {
            Ok(bytes) => (
                [("content-disposition", format!("attachment; filename=\"{filename}\""))],
                Body::from(bytes),
            )
                .into_response(),
            Err(err) => err.into_response(),
        },
    }
}

async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn create_schedule(State(state): State<AppState>, Json(spec): Json<ScheduledJobSpec>) -> Response {
    match state.schedules.save_spec(&spec).await {
        Ok(()) => (StatusCode::CREATED, Json(spec)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn list_schedules(State(state): State<AppState>) -> Response {
    match state.schedules.list_schedule_ids().await {
        Ok(ids) => Json(ids).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_schedule(State(state): State<AppState>, AxumPath(schedule_id): AxumPath<String>) -> Response {
    match state.schedules.load_spec(&schedule_id).await {
        Ok(spec) => Json(spec).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_schedule_status(State(state): State<AppState>, AxumPath(schedule_id): AxumPath<String>) -> Response {
    match state.schedules.load_status_if_present(&schedule_id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => Json(ScheduledJobStatus::default()).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn build_router(manager: ExecutionManager, schedules: ScheduleStore) -> Router {
    let state = AppState { manager: Arc::new(manager), schedules: Arc::new(schedules) };

    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/logs", get(get_job_logs))
        .route("/jobs/:id/context", get(get_job_context))
        .route("/traces/:trace_id/sync", post(sync_trace))
        .route("/sandbox/:job_id/*path", get(sandbox_file))
        .route("/schedules", post(create_schedule).get(list_schedules))
        .route("/schedules/:id", get(get_schedule))
        .route("/schedules/:id/status", get(get_schedule_status))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until Ctrl+C, mirroring `serve_swarm`'s
/// bind-then-`axum::serve` shape generalized to tokio's async `main`.
pub async fn serve(listen_addr: &str, manager: ExecutionManager, schedules: ScheduleStore) -> anyhow::Result<()> {
    let app = build_router(manager, schedules);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(listen = %listen_addr, "docflow orchestrator listening");
    axum::serve(listener, app).await?;
    Ok(())
}
