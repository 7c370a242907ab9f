//! Task identity and lifecycle types (spec.md §3, §4.1).
//!
//! `TaskId` is a stable short digest so traces and short-name maps can
//! reference a task without carrying its full description around.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Derive a stable id from a description and a disambiguating sequence
    /// number, so re-running the same session deterministically reproduces
    /// the same ids (useful for trace diffing in tests).
    pub fn derive(description: &str, seq: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(description.as_bytes());
        hasher.update(seq.to_le_bytes());
        let digest = hasher.finalize();
        let bytes: [u8; 8] = digest[..8].try_into().expect("sha256 digest is >= 8 bytes");
        Self(u64::from_be_bytes(bytes))
    }

    pub fn as_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// Tag recorded on tasks produced by the new-task parser, distinguishing
/// them from the initial description and from recovery tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedByPhase {
    NewTaskGeneration,
    InputRecovery,
    SubtreeCompaction,
}

/// A description awaiting SOP resolution and tool binding (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub task_id: TaskId,
    pub description: String,
    pub short_name: String,
    pub parent_task_id: Option<TaskId>,
    pub generated_by_phase: Option<GeneratedByPhase>,
}

impl PendingTask {
    pub fn root(description: impl Into<String>, seq: u64) -> Self {
        let description = description.into();
        let task_id = TaskId::derive(&description, seq);
        Self {
            short_name: default_short_name(&description, task_id),
            task_id,
            description,
            parent_task_id: None,
            generated_by_phase: None,
        }
    }

    pub fn child(
        description: impl Into<String>,
        parent_task_id: TaskId,
        seq: u64,
        generated_by_phase: GeneratedByPhase,
    ) -> Self {
        let description = description.into();
        let task_id = TaskId::derive(&description, seq);
        Self {
            short_name: default_short_name(&description, task_id),
            task_id,
            description,
            parent_task_id: Some(parent_task_id),
            generated_by_phase: Some(generated_by_phase),
        }
    }
}

/// Placeholder label used until `assign_short_names` (§4.5) replaces it;
/// guaranteed unique because it's keyed on the task id.
fn default_short_name(description: &str, task_id: TaskId) -> String {
    let words: String = description
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    format!("{words}_{}", &task_id.as_hex()[..6])
}

/// Per-task execution state (spec.md §4.1 state machine). Transitions to
/// `Failed` can occur from any other state; only `InputsResolving` failing
/// with a missing-input error is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    InputsResolving,
    ToolExecuting,
    ContextUpdating,
    NewTaskGenerating,
    Completed,
    Failed,
}

/// A tool binding resolved for a task: the tool id plus its rendered
/// parameter map (after `{var}` substitution and `{parameters.X}`
/// resolution against the SOP body).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolBinding {
    pub tool_id: String,
    pub parameters: IndexMap<String, String>,
}

/// A task resolved against an SOP document and bound to a tool (spec.md
/// §3 `Task`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub description: String,
    pub short_name: String,
    pub parent_task_id: Option<TaskId>,
    pub sop_doc_id: String,
    pub tool: ToolBinding,
    /// field -> JSON path into context, populated during task creation;
    /// may point at synthesized `_temp_input_*` keys.
    pub input_json_path: IndexMap<String, String>,
    /// May be empty until resolved post-execution (§4.1 step 5).
    pub output_json_path: Option<String>,
    pub output_description: Option<String>,
    pub skip_new_task_generation: bool,
    pub requires_planning_metadata: bool,
    pub state: TaskState,
    /// Number of missing-input recovery attempts consumed so far.
    pub retries: usize,
}

impl Task {
    pub fn mark_state(&mut self, state: TaskState) {
        self.state = state;
    }

    pub fn mark_failed(&mut self) {
        self.state = TaskState::Failed;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_deterministic() {
        let a = TaskId::derive("summarize the report", 0);
        let b = TaskId::derive("summarize the report", 0);
        let c = TaskId::derive("summarize the report", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn task_id_hex_is_16_chars() {
        let id = TaskId::derive("x", 7);
        assert_eq!(id.as_hex().len(), 16);
    }

    #[test]
    fn pending_child_carries_parent_and_phase_tag() {
        let root = PendingTask::root("root task", 0);
        let child = PendingTask::child("child task", root.task_id, 1, GeneratedByPhase::NewTaskGeneration);
        assert_eq!(child.parent_task_id, Some(root.task_id));
        assert_eq!(child.generated_by_phase, Some(GeneratedByPhase::NewTaskGeneration));
    }

    #[test]
    fn short_names_differ_for_identical_first_words() {
        let a = PendingTask::root("deploy the service to staging", 0);
        let b = PendingTask::root("deploy the service to production", 1);
        assert_ne!(a.short_name, b.short_name);
    }
}
