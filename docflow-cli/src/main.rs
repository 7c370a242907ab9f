//! Entry point: dispatches to the `run` (single-job runner) and `serve`
//! (HTTP orchestrator) subcommands, mirroring `skilllite::main`'s
//! `match cli.command { ... }` shape.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use docflow_core::config::{EngineConfig, LlmConfig, ObservabilityConfig, OrchestratorConfig, PathsConfig, ResolverConfig};
use docflow_core::observability::init_tracing;
use docflow_core::Context;
use docflow_engine::{Engine, ToolRegistry};
use docflow_orchestrator::{ExecutionManager, ScheduleStore};
use docflow_resolver::{EmbeddingCache, VectorIndex};
use docflow_sop::Corpus;
use docflow_tools::llm::LlmClient;
use docflow_tools::tools::{LlmTool, PythonSandboxTool, ShellSandboxTool, TemplateFillTool, UserCommunicateTool, WebUserCommunicateTool};
use docflow_tools::traced::TracedTool;
use docflow_trace::TraceWriter;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { job_id, task_file, max_tasks, trace_file, context_file, env_file } => {
            apply_env_file(&env_file)?;
            init_tracing(&ObservabilityConfig::from_env());
            run_job(job_id, task_file, max_tasks, trace_file, context_file).await
        }
        Commands::Serve { listen_addr } => {
            init_tracing(&ObservabilityConfig::from_env());
            serve(listen_addr).await
        }
    }
}

/// Applies the job's `env.json` (written by the orchestrator alongside
/// `request.json`/`<job_id>.task`) to the process environment before any
/// `*Config::from_env()` call reads it.
fn apply_env_file(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let bytes = std::fs::read(path)?;
    let vars: HashMap<String, String> = serde_json::from_slice(&bytes)?;
    for (key, value) in vars {
        // SAFETY: single-threaded startup, before tokio spawns any worker
        // that might read the environment concurrently.
        unsafe {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

async fn run_job(job_id: String, task_file: std::path::PathBuf, max_tasks: usize, trace_file: String, context_file: std::path::PathBuf) -> anyhow::Result<()> {
    let task_description = std::fs::read_to_string(&task_file)?.trim().to_string();

    let paths = PathsConfig::from_env();
    let llm_config = LlmConfig::from_env();
    let engine_config = {
        let mut cfg = EngineConfig::from_env();
        cfg.max_tasks = max_tasks;
        cfg
    };
    let resolver_config = ResolverConfig::from_env();

    let corpus = Corpus::new(&paths.sop_dir);
    let engine_client = LlmClient::new(llm_config.clone());

    let vector_index = build_vector_index(&corpus, &llm_config, &paths).await?;

    let trace_path = paths.trace_dir.join(&trace_file);
    let trace = Arc::new(Mutex::new(TraceWriter::create(&trace_path, job_id.clone(), Some(job_id.clone()))?));

    let sandbox_base_url = docflow_core::config::loader::env_or(docflow_core::config::env_keys::tools::SANDBOX_BASE_URL).unwrap_or_default();
    let user_comm_root = paths.jobs_dir.join(&job_id).join("user_comm");
    let tool_client = LlmClient::new(llm_config);

    let mut engine = Engine::new(
        task_description.clone(),
        Context::new(),
        corpus,
        engine_client,
        vector_index,
        trace.clone(),
        engine_config,
        resolver_config,
        move |sink| {
            let mut registry = ToolRegistry::new();
            registry.register(Arc::new(TracedTool::new(LlmTool::new(tool_client), sink.clone())));
            registry.register(Arc::new(TracedTool::new(TemplateFillTool, sink.clone())));
            registry.register(Arc::new(TracedTool::new(UserCommunicateTool::new(user_comm_root), sink.clone())));
            registry.register(Arc::new(TracedTool::new(WebUserCommunicateTool, sink.clone())));
            registry.register(Arc::new(TracedTool::new(ShellSandboxTool::new(sandbox_base_url.clone()), sink.clone())));
            registry.register(Arc::new(TracedTool::new(PythonSandboxTool::new(sandbox_base_url), sink)));
            registry
        },
    );

    let result = engine.start(task_description).await;

    engine.context().save_to_file(&context_file)?;

    match result {
        Ok(events) => {
            tracing::info!(job_id, tasks = events.len(), "job completed");
            Ok(())
        }
        Err(err) => {
            tracing::error!(job_id, error = %err, "job failed");
            Err(err.into())
        }
    }
}

/// Builds a vector index over the whole corpus when query rewrite or
/// vector fallback may need it; returns `None` if the corpus is empty so a
/// first-run job without SOP documents doesn't error out.
async fn build_vector_index(corpus: &Corpus, llm_config: &LlmConfig, paths: &PathsConfig) -> anyhow::Result<Option<VectorIndex>> {
    let doc_ids = corpus.list_doc_ids()?;
    if doc_ids.is_empty() {
        return Ok(None);
    }
    let mut docs = Vec::with_capacity(doc_ids.len());
    for doc_id in &doc_ids {
        let doc = corpus.load(doc_id)?;
        docs.push((doc.doc_id.clone(), doc.description.clone(), doc.aliases.clone()));
    }

    let cache_path = paths.cache_dir.join("embeddings").join(format!("{}.json", llm_config.embedding_model));
    let mut cache = EmbeddingCache::load_or_create(&cache_path)?;
    let client = LlmClient::new(llm_config.clone());
    let index = VectorIndex::build(&docs, &client, &mut cache).await?;
    cache.save()?;
    Ok(Some(index))
}

async fn serve(listen_addr_override: Option<String>) -> anyhow::Result<()> {
    let paths = PathsConfig::from_env();
    let orchestrator_config = OrchestratorConfig::from_env();
    let listen_addr = listen_addr_override.unwrap_or(orchestrator_config.listen_addr.clone());

    let manager = ExecutionManager::new(&paths, &orchestrator_config).await?;
    let schedules = ScheduleStore::new(&paths.schedules_dir);

    docflow_orchestrator::serve(&listen_addr, manager, schedules).await
}
