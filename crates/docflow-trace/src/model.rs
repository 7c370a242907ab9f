//! Plain data types making up a trace. Kept free of any write/IO concerns
//! so they can be constructed and asserted on in tests without touching
//! the filesystem.

use docflow_core::task::TaskId;
use serde::{Deserialize, Serialize};

/// One sub-step of a phase: a single observation worth recording (e.g. a
/// resolver decision, a single LLM call, a path-generator result).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubStep {
    pub label: String,
    pub detail: serde_json::Value,
    /// Milliseconds since the owning session started; monotonic within a
    /// session (spec.md §8 invariant).
    pub at_ms: u64,
}

/// A named stage of a task's execution (e.g. "resolve", "generate_paths",
/// "execute_tool", "record_output").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub sub_steps: Vec<SubStep>,
}

impl Phase {
    fn new(name: impl Into<String>, started_at_ms: u64) -> Self {
        Self {
            name: name.into(),
            started_at_ms,
            ended_at_ms: None,
            sub_steps: Vec::new(),
        }
    }
}

/// The full record of one task's path through the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub task_id: TaskId,
    pub description: String,
    pub doc_id: Option<String>,
    pub tool_id: Option<String>,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub outcome: Option<String>,
    pub phases: Vec<Phase>,
}

impl TaskExecutionRecord {
    fn new(task_id: TaskId, description: impl Into<String>, started_at_ms: u64) -> Self {
        Self {
            task_id,
            description: description.into(),
            doc_id: None,
            tool_id: None,
            started_at_ms,
            ended_at_ms: None,
            outcome: None,
            phases: Vec::new(),
        }
    }
}

/// The whole session: every task execution recorded so far, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub job_id: Option<String>,
    pub started_at_ms: u64,
    pub records: Vec<TaskExecutionRecord>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, job_id: Option<String>, started_at_ms: u64) -> Self {
        Self {
            session_id: session_id.into(),
            job_id,
            started_at_ms,
            records: Vec::new(),
        }
    }

    pub(crate) fn begin_task(&mut self, task_id: TaskId, description: impl Into<String>, now_ms: u64) {
        self.records.push(TaskExecutionRecord::new(task_id, description, now_ms));
    }

    pub(crate) fn current_task_mut(&mut self) -> Option<&mut TaskExecutionRecord> {
        self.records.last_mut()
    }

    pub(crate) fn begin_phase(&mut self, name: impl Into<String>, now_ms: u64) -> Option<()> {
        let record = self.current_task_mut()?;
        record.phases.push(Phase::new(name, now_ms));
        Some(())
    }

    pub(crate) fn current_phase_mut(&mut self) -> Option<&mut Phase> {
        self.current_task_mut()?.phases.last_mut()
    }

    pub(crate) fn end_phase(&mut self, now_ms: u64) -> Option<()> {
        let phase = self.current_phase_mut()?;
        phase.ended_at_ms = Some(now_ms);
        Some(())
    }

    pub(crate) fn end_task(&mut self, outcome: impl Into<String>, now_ms: u64) -> Option<()> {
        let record = self.current_task_mut()?;
        record.ended_at_ms = Some(now_ms);
        record.outcome = Some(outcome.into());
        Some(())
    }
}
