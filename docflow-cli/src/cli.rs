//! Command-line surface, mirroring the teacher's `clap::Parser`/
//! `clap::Subcommand` layout (one doc comment per variant becomes its
//! `--help` text).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docflow", author, version, about = "Document-driven task execution engine and job orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single job to completion in this process (spec.md §6.1, §6.3).
    /// Invoked by the orchestrator's `ExecutionManager` as a re-exec'd
    /// subprocess; also usable directly for local debugging.
    Run {
        /// The job id this run belongs to; also becomes the trace session id.
        #[arg(long)]
        job_id: String,

        /// Path to the file holding the task description text.
        #[arg(long)]
        task_file: PathBuf,

        /// Hard cap on tasks executed this run (spec.md §4.1 max_tasks).
        #[arg(long, default_value_t = 50)]
        max_tasks: usize,

        /// Trace file name, resolved under `DOCFLOW_TRACE_DIR`.
        #[arg(long)]
        trace_file: String,

        /// Where the final `Context` is written on completion.
        #[arg(long)]
        context_file: PathBuf,

        /// JSON map of extra environment variables to apply before running.
        #[arg(long)]
        env_file: PathBuf,
    },
    /// Start the HTTP job orchestrator (spec.md §6.2).
    Serve {
        /// Overrides `DOCFLOW_LISTEN_ADDR`.
        #[arg(long)]
        listen_addr: Option<String>,
    },
}
