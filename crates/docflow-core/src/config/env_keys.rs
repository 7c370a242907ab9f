//! Environment variable names, grouped by concern, each with an optional
//! list of aliases for backward-compatible names users may already have
//! set (grounded on `skilllite_core::config::env_keys`).

pub mod llm {
    pub const API_BASE: (&str, &[&str]) = ("DOCFLOW_API_BASE", &["OPENAI_API_BASE", "OPENAI_BASE_URL"]);
    pub const API_KEY: (&str, &[&str]) = ("DOCFLOW_API_KEY", &["OPENAI_API_KEY"]);
    pub const MODEL: (&str, &[&str]) = ("DOCFLOW_MODEL", &["OPENAI_MODEL"]);
    pub const EMBEDDING_MODEL: (&str, &[&str]) = ("DOCFLOW_EMBEDDING_MODEL", &[]);
    pub const REQUEST_TIMEOUT_SECS: (&str, &[&str]) = ("DOCFLOW_LLM_TIMEOUT_SECS", &[]);
}

pub mod paths {
    pub const SOP_DIR: (&str, &[&str]) = ("DOCFLOW_SOP_DIR", &["DOCFLOW_DOCS_DIR"]);
    pub const TRACE_DIR: (&str, &[&str]) = ("DOCFLOW_TRACE_DIR", &[]);
    pub const JOBS_DIR: (&str, &[&str]) = ("DOCFLOW_JOBS_DIR", &[]);
    pub const SCHEDULES_DIR: (&str, &[&str]) = ("DOCFLOW_SCHEDULES_DIR", &[]);
    pub const CACHE_DIR: (&str, &[&str]) = ("DOCFLOW_CACHE_DIR", &[]);
}

pub mod engine {
    pub const MAX_TASKS: (&str, &[&str]) = ("DOCFLOW_MAX_TASKS", &[]);
    pub const MAX_RETRIES: (&str, &[&str]) = ("DOCFLOW_MAX_RETRIES", &[]);
    pub const ENABLE_COMPACTION: (&str, &[&str]) = ("DOCFLOW_ENABLE_COMPACTION", &[]);
    pub const USE_EXECUTION_PREFIX: (&str, &[&str]) = ("DOCFLOW_USE_EXECUTION_PREFIX", &[]);
}

pub mod resolver {
    pub const VECTOR_SEARCH_THRESHOLD: (&str, &[&str]) = ("DOCFLOW_VECTOR_SEARCH_THRESHOLD", &[]);
    pub const ENABLE_QUERY_REWRITE: (&str, &[&str]) = ("DOCFLOW_ENABLE_QUERY_REWRITE", &[]);
}

pub mod orchestrator {
    pub const LISTEN_ADDR: (&str, &[&str]) = ("DOCFLOW_LISTEN_ADDR", &[]);
    pub const MAX_PARALLEL_JOBS: (&str, &[&str]) = ("DOCFLOW_MAX_PARALLEL_JOBS", &[]);
    pub const SANDBOX_BASE_URL: (&str, &[&str]) = ("DOCFLOW_SANDBOX_BASE_URL", &[]);
    /// Test hook mirroring the teacher's `ORCHESTRATOR_RUNNER_MODULE`: lets
    /// a test swap in a fake runner binary instead of re-execing the real
    /// `docflow-cli`.
    pub const RUNNER_BIN: (&str, &[&str]) = ("DOCFLOW_RUNNER_BIN", &[]);
}

pub mod tools {
    /// The sandbox a running job's `shell`/`python` tools call out to,
    /// grounded on `utils.sandbox.get_sandbox_base_url`'s precedence order.
    ///
    /// Shares its primary name with [`super::orchestrator::SANDBOX_BASE_URL`]
    /// by design: both point at the same sandbox deployment in practice, one
    /// configuring per-call shell/python exec and the other whole-job remote
    /// execution. Set the var once and both pick it up.
    pub const SANDBOX_BASE_URL: (&str, &[&str]) = ("DOCFLOW_SANDBOX_BASE_URL", &["WORKSPACE_SANDBOX_URL", "DEFAULT_WORKSPACE_SANDBOX_URL"]);
}

pub mod observability {
    pub const LOG_LEVEL: (&str, &[&str]) = ("DOCFLOW_LOG_LEVEL", &["RUST_LOG"]);
    pub const LOG_FORMAT: (&str, &[&str]) = ("DOCFLOW_LOG_FORMAT", &[]);
}
