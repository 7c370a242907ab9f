//! `tracing-subscriber` initialization, shared by the CLI runner and the
//! orchestrator server binary (grounded on `ObservabilityConfig`'s role in
//! the teacher: operational logging is kept separate from the structured
//! execution trace written by `docflow-trace`).

use crate::config::ObservabilityConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global subscriber. Safe to call once per process; a second
/// call is a logic error in the caller, not something this function
/// guards against, matching the teacher's single-binary-entrypoint usage.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
