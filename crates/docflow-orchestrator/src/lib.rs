//! Job orchestration: subprocess supervision, HTTP surface, and schedule
//! storage (spec.md §4.8, §4.9, §6). Generalized from
//! `orchestrator_service`'s `ExecutionManager`/FastAPI pair onto
//! `tokio`/`axum`, in the idiom `skilllite-swarm::handler` already
//! establishes for this workspace's HTTP daemons.

pub mod error;
pub mod http;
pub mod job;
pub mod manager;
pub mod sandbox_client;
pub mod schedule;

pub use error::{OrchestratorError, OrchestratorResult};
pub use http::{build_router, serve, AppState};
pub use job::{Job, JobError, JobStatus};
pub use manager::{ExecutionManager, SandboxFileResolution};
pub use sandbox_client::{SandboxClient, SandboxClientError, SandboxSession};
pub use schedule::{ScheduleStore, ScheduledJobSpec, ScheduledJobStatus, ScheduledJobTemplate};
