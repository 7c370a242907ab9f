//! The recursive LIFO task-execution loop (spec.md §4.1), grounded on
//! `skilllite_agent::agent_loop::run_agent_loop`'s pop-resolve-execute-push
//! structure, generalized from a single flat agent loop to a tree of tasks
//! that can spawn their own children.

use crate::compaction;
use crate::error::{EngineRunError, EngineRunResult};
use crate::new_tasks;
use crate::registry::ToolRegistry;
use docflow_core::config::{EngineConfig, ResolverConfig};
use docflow_core::jsonpath;
use docflow_core::task::{GeneratedByPhase, ToolBinding};
use docflow_core::{Context, EngineError, PendingTask, Task, TaskId, TaskState};
use docflow_pathgen::SmartJsonPathGenerator;
use docflow_resolver::{PlanningMetadata, QueryRewriteMode, SopResolver, VectorIndex};
use docflow_sop::{Corpus, SopDocument};
use docflow_tools::llm::LlmClient;
use docflow_tools::retry::{execute_with_retries, RetryStrategy};
use docflow_tools::{LlmCallRecord, ToolCallArgs, ToolCallRecord, TraceSink};
use docflow_trace::TraceWriter;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Coarse-grained progress events a caller (CLI, orchestrator) can log or
/// stream without parsing the trace file.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TaskStarted { task_id: TaskId, description: String },
    TaskCompleted { task_id: TaskId },
    TaskRetried { task_id: TaskId, attempt: usize },
    SessionCompleted { tasks_executed: u64 },
}

/// Bridges [`docflow_tools::traced::TracedTool`]'s per-call records into
/// the engine's own [`TraceWriter`], so both land in the one trace file
/// instead of two disjoint logs.
struct EngineTraceSink {
    trace: Arc<Mutex<TraceWriter>>,
}

impl TraceSink for EngineTraceSink {
    fn record_tool_call(&self, record: ToolCallRecord) {
        let (result_ok, result_err) = match &record.result {
            Ok(v) => (Some(v.clone()), None),
            Err(e) => (None, Some(e.clone())),
        };
        let detail = serde_json::json!({
            "tool_id": record.tool_id,
            "params": record.params,
            "result_ok": result_ok,
            "result_err": result_err,
            "duration_ms": record.duration_ms as u64,
        });
        if let Ok(mut writer) = self.trace.lock() {
            if let Err(err) = writer.record_sub_step("tool_call", detail) {
                tracing::warn!(error = %err, "failed to record tool_call sub-step");
            }
        }
    }

    fn record_llm_call(&self, record: LlmCallRecord) {
        let detail = serde_json::json!({
            "model": record.model,
            "prompt_tokens": record.prompt_tokens,
            "completion_tokens": record.completion_tokens,
            "native_tool_call_names": record.native_tool_call_names,
        });
        if let Ok(mut writer) = self.trace.lock() {
            if let Err(err) = writer.record_sub_step("llm_call", detail) {
                tracing::warn!(error = %err, "failed to record llm_call sub-step");
            }
        }
    }
}

pub struct Engine {
    user_ask: String,
    context: Context,
    corpus: Corpus,
    client: LlmClient,
    vector_index: Option<VectorIndex>,
    registry: ToolRegistry,
    trace: Arc<Mutex<TraceWriter>>,
    config: EngineConfig,
    resolver_config: ResolverConfig,
    task_stack: Vec<PendingTask>,
    task_retry_count: HashMap<TaskId, usize>,
    completed_tasks: Vec<Task>,
    task_execution_counter: u64,
    seq_counter: u64,
    events: Vec<EngineEvent>,
}

impl Engine {
    /// `registry_builder` receives the [`TraceSink`] wired to this engine's
    /// trace file, so callers wrap each concrete tool in a `TracedTool`
    /// before registering it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_ask: impl Into<String>,
        context: Context,
        corpus: Corpus,
        client: LlmClient,
        vector_index: Option<VectorIndex>,
        trace: Arc<Mutex<TraceWriter>>,
        config: EngineConfig,
        resolver_config: ResolverConfig,
        registry_builder: impl FnOnce(Arc<dyn TraceSink>) -> ToolRegistry,
    ) -> Self {
        let sink: Arc<dyn TraceSink> = Arc::new(EngineTraceSink { trace: trace.clone() });
        let registry = registry_builder(sink);
        Self {
            user_ask: user_ask.into(),
            context,
            corpus,
            client,
            vector_index,
            registry,
            trace,
            config,
            resolver_config,
            task_stack: Vec::new(),
            task_retry_count: HashMap::new(),
            completed_tasks: Vec::new(),
            task_execution_counter: 0,
            seq_counter: 0,
            events: Vec::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn completed_tasks(&self) -> &[Task] {
        &self.completed_tasks
    }

    fn next_seq(&mut self) -> u64 {
        self.seq_counter += 1;
        self.seq_counter
    }

    /// Entry point: seed the stack with a single root task and run the
    /// loop to completion (or to the first unrecoverable error).
    pub async fn start(&mut self, initial_description: impl Into<String>) -> EngineRunResult<Vec<EngineEvent>> {
        let seq = self.next_seq();
        let root = PendingTask::root(initial_description, seq);
        self.context.set_current_task(&root.description);
        self.task_stack.push(root);
        self.run().await
    }

    /// spec.md §4.1: pop, resolve-and-create, execute, push children in
    /// reverse order (so the first-listed child runs first), bounded
    /// missing-input recovery, hard `max_tasks` cap.
    async fn run(&mut self) -> EngineRunResult<Vec<EngineEvent>> {
        while let Some(pending) = self.task_stack.pop() {
            if self.task_execution_counter >= self.config.max_tasks as u64 {
                self.context.set_max_tasks_reached();
                break;
            }
            self.task_execution_counter += 1;
            self.events.push(EngineEvent::TaskStarted { task_id: pending.task_id, description: pending.description.clone() });

            match self.resolve_and_create(pending.clone()).await {
                Ok(task) => match self.execute_task(task).await {
                    Ok(new_tasks) => {
                        self.events.push(EngineEvent::TaskCompleted { task_id: pending.task_id });
                        for child in new_tasks.into_iter().rev() {
                            self.task_stack.push(child);
                        }
                    }
                    Err(err) => {
                        let _ = self.trace_end_task(format!("failed: {err}"));
                        return Err(err);
                    }
                },
                Err(err) if Self::is_recoverable(&err) => {
                    let retries = self.task_retry_count.entry(pending.task_id).or_insert(0);
                    if *retries >= self.config.max_retries {
                        return Err(EngineRunError::TaskCreationExhausted {
                            field: Self::missing_input_detail(&err).0,
                            description: pending.description.clone(),
                        });
                    }
                    *retries += 1;
                    let attempt = *retries;
                    let _ = self.trace_end_task(format!("retrying: {err}"));

                    let (field, description) = Self::missing_input_detail(&err);
                    let recovery_seq = self.next_seq();
                    let recovery = PendingTask::child(
                        format!("Produce the missing input '{field}' needed for: {description}"),
                        pending.task_id,
                        recovery_seq,
                        GeneratedByPhase::InputRecovery,
                    );
                    self.events.push(EngineEvent::TaskRetried { task_id: pending.task_id, attempt });
                    self.task_stack.push(pending);
                    self.task_stack.push(recovery);
                }
                Err(err) => {
                    let _ = self.trace_end_task(format!("failed: {err}"));
                    return Err(err);
                }
            }
        }
        self.events.push(EngineEvent::SessionCompleted { tasks_executed: self.task_execution_counter });
        Ok(std::mem::take(&mut self.events))
    }

    fn is_recoverable(err: &EngineRunError) -> bool {
        matches!(err, EngineRunError::Pathgen(docflow_pathgen::PathgenError::InputMissing { .. }))
            || matches!(err, EngineRunError::Core(EngineError::TaskInputMissing { .. }))
    }

    fn missing_input_detail(err: &EngineRunError) -> (String, String) {
        match err {
            EngineRunError::Pathgen(docflow_pathgen::PathgenError::InputMissing { field, description }) => {
                (field.clone(), description.clone())
            }
            EngineRunError::Core(EngineError::TaskInputMissing { field, description }) => (field.clone(), description.clone()),
            _ => ("unknown".to_string(), "unknown".to_string()),
        }
    }

    /// sop_resolution + task_creation phases (spec.md §4.1 steps 1-4).
    async fn resolve_and_create(&mut self, pending: PendingTask) -> EngineRunResult<Task> {
        self.trace_begin_task(&pending)?;

        self.trace_begin_phase("sop_resolution")?;
        let mode = if self.resolver_config.enable_query_rewrite { QueryRewriteMode::Auto } else { QueryRewriteMode::Off };
        let resolver = SopResolver::new(&self.corpus, &self.client, self.vector_index.as_ref(), self.resolver_config.vector_search_threshold, mode);
        let resolution = resolver.resolve(&pending.description).await?;
        self.trace_record_sub_step("resolved_doc", serde_json::json!({ "doc_id": resolution.doc_id }))?;
        self.trace_end_phase()?;

        if let Some(message) = &resolution.message_to_user {
            self.context.set("pending_message_to_user", Value::String(message.clone()));
        }

        let doc = self.corpus.load(&resolution.doc_id)?;
        self.trace_set_resolution(resolution.doc_id.clone(), doc.tool.tool_id.clone())?;

        self.trace_begin_phase("task_creation")?;
        let input_json_path = self.resolve_task_inputs(&pending, &doc).await?;
        let task = Task {
            task_id: pending.task_id,
            description: pending.description.clone(),
            short_name: pending.short_name.clone(),
            parent_task_id: pending.parent_task_id,
            sop_doc_id: resolution.doc_id.clone(),
            tool: ToolBinding { tool_id: doc.tool.tool_id.clone(), parameters: doc.tool.parameters.clone() },
            input_json_path,
            output_json_path: doc.output_json_path.clone(),
            output_description: doc.output_description.clone(),
            skip_new_task_generation: doc.skip_new_task_generation,
            requires_planning_metadata: doc.requires_planning_metadata,
            state: TaskState::Created,
            retries: 0,
        };
        self.trace_record_sub_step("task_created", serde_json::to_value(&task).unwrap_or(Value::Null))?;
        self.trace_end_phase()?;
        Ok(task)
    }

    /// Fields with a blank path in the SOP's `input_json_path` need
    /// synthesis; fields with a literal path are used as-is. One field
    /// uses the single-field generator, several use the batch generator
    /// (spec.md §4.4).
    async fn resolve_task_inputs(&mut self, pending: &PendingTask, doc: &SopDocument) -> EngineRunResult<IndexMap<String, String>> {
        let mut resolved = IndexMap::new();
        let mut unresolved: IndexMap<String, String> = IndexMap::new();
        for (field, path) in &doc.input_json_path {
            if path.trim().is_empty() {
                let description = doc.input_description.clone().unwrap_or_else(|| field.clone());
                unresolved.insert(field.clone(), description);
            } else {
                resolved.insert(field.clone(), path.clone());
            }
        }
        if unresolved.is_empty() {
            return Ok(resolved);
        }

        let generator = SmartJsonPathGenerator::new(&self.client);
        let meaning = |_: &str| None;
        if unresolved.len() == 1 {
            let (field, description) = unresolved.into_iter().next().expect("checked non-empty above");
            let path = generator
                .generate_input_path(&mut self.context, &self.user_ask, &pending.short_name, &field, &description, &meaning)
                .await?;
            resolved.insert(field, path);
        } else {
            let batch = generator
                .generate_input_paths_batch(&mut self.context, &self.user_ask, &pending.short_name, &unresolved, &meaning)
                .await?;
            resolved.extend(batch);
        }
        Ok(resolved)
    }

    /// task_execution + context_update + new_task_generation phases
    /// (spec.md §4.1 steps 5-9).
    async fn execute_task(&mut self, mut task: Task) -> EngineRunResult<Vec<PendingTask>> {
        self.context.set_current_task(&task.description);

        if task.requires_planning_metadata {
            self.inject_planning_metadata(&task).await?;
        }

        self.trace_begin_phase("task_execution")?;
        task.mark_state(TaskState::ToolExecuting);
        let tool = self
            .registry
            .get(&task.tool.tool_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTool(task.tool.tool_id.clone()))?;
        let params = self.render_tool_parameters(&task)?;
        let doc = self.corpus.load(&task.sop_doc_id)?;

        let output = match execute_with_retries(tool.as_ref(), &params, Some(doc.body.as_str()), &[RetryStrategy::Simple], self.config.max_retries, &[]).await {
            Ok(value) => value,
            Err(source) => {
                task.mark_failed();
                let _ = self.trace_end_phase();
                return Err(EngineError::ToolExecution { tool_id: task.tool.tool_id.clone(), message: source.to_string() }.into());
            }
        };
        self.trace_record_sub_step("tool_output", output.clone())?;
        self.trace_end_phase()?;

        self.trace_begin_phase("context_update")?;
        task.mark_state(TaskState::ContextUpdating);
        let output_path = self.resolve_output_path(&task, &output).await?;
        self.write_output(&output_path, &output)?;
        self.context.set_last_task_output(output.clone());
        self.context.clear_temp_inputs();
        task.output_json_path = Some(output_path);
        self.trace_end_phase()?;

        let new_tasks = if task.skip_new_task_generation {
            Vec::new()
        } else {
            self.trace_begin_phase("new_task_generation")?;
            task.mark_state(TaskState::NewTaskGenerating);
            let generated = self.generate_new_tasks(&task, &output).await?;
            self.trace_record_sub_step("generated_tasks", serde_json::to_value(&generated).unwrap_or(Value::Null))?;
            self.trace_end_phase()?;
            generated
        };

        let new_tasks = if self.config.enable_compaction {
            self.attempt_compaction(&mut task, new_tasks).await?
        } else {
            new_tasks
        };

        task.mark_state(TaskState::Completed);
        self.trace_end_task("completed")?;
        self.completed_tasks.push(task);
        Ok(new_tasks)
    }

    async fn resolve_output_path(&self, task: &Task, output: &Value) -> EngineRunResult<String> {
        match &task.output_json_path {
            Some(path) if !path.trim().is_empty() => Ok(path.clone()),
            _ => {
                let generator = SmartJsonPathGenerator::new(&self.client);
                let description = task.output_description.clone().unwrap_or_else(|| "the task's result".to_string());
                Ok(generator.generate_output_path(&self.user_ask, &task.short_name, &description, output).await?)
            }
        }
    }

    fn write_output(&mut self, output_path: &str, output: &Value) -> EngineRunResult<()> {
        let path = if self.config.use_execution_prefix {
            let prefix = format!("msg{}_", self.task_execution_counter);
            jsonpath::apply_execution_prefix(output_path, &prefix).unwrap_or_else(|| output_path.to_string())
        } else {
            output_path.to_string()
        };
        jsonpath::write_top_level(&mut self.context, &path, output.clone())
            .ok_or_else(|| EngineError::InputPathUnresolved { field: "output".to_string(), path }.into())
    }

    async fn generate_new_tasks(&mut self, task: &Task, output: &Value) -> EngineRunResult<Vec<PendingTask>> {
        let seq_start = self.next_seq();
        let mut generated =
            new_tasks::extract_new_tasks(&self.client, &self.user_ask, task.task_id, &task.description, output, seq_start).await?;
        if !generated.is_empty() {
            let existing_names: Vec<String> = self
                .completed_tasks
                .iter()
                .map(|t| t.short_name.clone())
                .chain(generated.iter().map(|t| t.short_name.clone()))
                .collect();
            new_tasks::assign_short_names(&self.client, &mut generated, &existing_names).await?;
        }
        Ok(generated)
    }

    /// spec.md §4.1 step 10 / §4.6: optionally collapse `task`'s completed
    /// sub-tree. When compaction reports unmet requirements, its follow-up
    /// tasks run ahead of `pending_continuation` (the tasks already
    /// produced by new-task generation); otherwise `pending_continuation`
    /// is returned unchanged.
    async fn attempt_compaction(&mut self, task: &mut Task, pending_continuation: Vec<PendingTask>) -> EngineRunResult<Vec<PendingTask>> {
        self.trace_begin_phase("subtree_compaction")?;
        let seq_start = self.next_seq();
        let outcome =
            compaction::evaluate_and_summarize_subtree(&self.client, &self.user_ask, &mut self.context, task, &self.completed_tasks, seq_start)
                .await?;
        let result = match outcome {
            compaction::CompactionOutcome::Collapsed => {
                self.trace_record_sub_step("compaction_collapsed", serde_json::json!({ "output_json_path": task.output_json_path }))?;
                pending_continuation
            }
            compaction::CompactionOutcome::Unmet { follow_ups } => {
                if follow_ups.is_empty() {
                    pending_continuation
                } else {
                    self.trace_record_sub_step("compaction_follow_ups", serde_json::to_value(&follow_ups).unwrap_or(Value::Null))?;
                    follow_ups.into_iter().chain(pending_continuation).collect()
                }
            }
        };
        self.trace_end_phase()?;
        Ok(result)
    }

    async fn inject_planning_metadata(&mut self, task: &Task) -> EngineRunResult<()> {
        let doc_ids = self.corpus.list_doc_ids()?;
        let mut available_tool_docs = Vec::new();
        for doc_id in &doc_ids {
            if doc_id.starts_with("tools/") {
                let doc = self.corpus.load(doc_id)?;
                available_tool_docs.push((doc_id.clone(), doc.description.clone()));
            }
        }
        let vector_candidates = if let Some(index) = &self.vector_index {
            let embedding = self.client.embed(&task.description).await?;
            index.query(&embedding, 5)
        } else {
            Vec::new()
        };
        let metadata = PlanningMetadata::build(&available_tool_docs, &vector_candidates);
        self.context.set("available_tool_docs_xml", Value::String(metadata.available_tool_docs_xml));
        self.context.set("vector_tool_suggestions_xml", Value::String(metadata.vector_tool_suggestions_xml));
        self.context.set("available_tool_docs_json", metadata.available_tool_docs_json);
        self.context.set("vector_tool_suggestions_json", metadata.vector_tool_suggestions_json);
        Ok(())
    }

    /// Render each tool parameter template against the task's resolved
    /// inputs. A template that is *exactly* `{field}` passes the value
    /// through untouched (so a tool can receive a JSON object or number,
    /// not just a string); any other template does `{field}` substring
    /// substitution and stringifies the substituted values, the same
    /// convention `tools::template_fill` uses for its own substitution.
    fn render_tool_parameters(&self, task: &Task) -> EngineRunResult<ToolCallArgs> {
        let mut resolved_inputs: IndexMap<String, Value> = IndexMap::new();
        for (field, path) in &task.input_json_path {
            let value = jsonpath::resolve(&self.context, path)
                .cloned()
                .ok_or_else(|| EngineError::InputPathUnresolved { field: field.clone(), path: path.clone() })?;
            resolved_inputs.insert(field.clone(), value);
        }

        let mut params: ToolCallArgs = IndexMap::new();
        for (param_key, template) in &task.tool.parameters {
            params.insert(param_key.clone(), render_parameter_template(template, &resolved_inputs));
        }
        Ok(params)
    }

    fn trace_begin_task(&self, pending: &PendingTask) -> EngineRunResult<()> {
        self.trace.lock().expect("trace writer mutex poisoned").begin_task(pending.task_id, pending.description.clone())?;
        Ok(())
    }

    fn trace_set_resolution(&self, doc_id: impl Into<String>, tool_id: impl Into<String>) -> EngineRunResult<()> {
        self.trace.lock().expect("trace writer mutex poisoned").set_resolution(doc_id.into(), tool_id.into())?;
        Ok(())
    }

    fn trace_begin_phase(&self, name: impl Into<String>) -> EngineRunResult<()> {
        self.trace.lock().expect("trace writer mutex poisoned").begin_phase(name.into())?;
        Ok(())
    }

    fn trace_record_sub_step(&self, label: impl Into<String>, detail: Value) -> EngineRunResult<()> {
        self.trace.lock().expect("trace writer mutex poisoned").record_sub_step(label.into(), detail)?;
        Ok(())
    }

    fn trace_end_phase(&self) -> EngineRunResult<()> {
        self.trace.lock().expect("trace writer mutex poisoned").end_phase()?;
        Ok(())
    }

    fn trace_end_task(&self, outcome: impl Into<String>) -> EngineRunResult<()> {
        self.trace.lock().expect("trace writer mutex poisoned").end_task(outcome.into())?;
        Ok(())
    }
}

fn render_parameter_template(template: &str, inputs: &IndexMap<String, Value>) -> Value {
    if let Some(field) = template.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        if !field.is_empty() && !field.contains('{') && !field.contains('}') {
            if let Some(value) = inputs.get(field) {
                return value.clone();
            }
        }
    }
    let mut rendered = template.to_string();
    for (field, value) in inputs {
        let placeholder = format!("{{{field}}}");
        if rendered.contains(&placeholder) {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &text);
        }
    }
    Value::String(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_placeholder_preserves_value_type() {
        let mut inputs = IndexMap::new();
        inputs.insert("payload".to_string(), json!({"a": 1}));
        assert_eq!(render_parameter_template("{payload}", &inputs), json!({"a": 1}));
    }

    #[test]
    fn embedded_placeholder_stringifies_into_surrounding_text() {
        let mut inputs = IndexMap::new();
        inputs.insert("name".to_string(), json!("ada"));
        assert_eq!(render_parameter_template("hello {name}!", &inputs), json!("hello ada!"));
    }

    #[test]
    fn template_without_matching_input_is_left_untouched() {
        let inputs = IndexMap::new();
        assert_eq!(render_parameter_template("static text", &inputs), json!("static text"));
    }
}
