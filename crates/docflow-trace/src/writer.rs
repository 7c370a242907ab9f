//! Incremental persistence: every mutating call rewrites the trace file
//! atomically, so a crashed session still leaves a complete-up-to-the-last-
//! step trace on disk (grounded on the teacher's `status.json` write-then-
//! rename idiom, reused here for the trace file).

use crate::error::{TraceError, TraceResult};
use crate::model::Session;
use docflow_core::task::TaskId;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct TraceWriter {
    session: Session,
    path: PathBuf,
    clock: Instant,
}

impl TraceWriter {
    pub fn create(path: impl Into<PathBuf>, session_id: impl Into<String>, job_id: Option<String>) -> TraceResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Self {
            session: Session::new(session_id, job_id, 0),
            path,
            clock: Instant::now(),
        };
        writer.persist()?;
        Ok(writer)
    }

    fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn persist(&self) -> TraceResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.session)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn begin_task(&mut self, task_id: TaskId, description: impl Into<String>) -> TraceResult<()> {
        let now = self.elapsed_ms();
        self.session.begin_task(task_id, description, now);
        self.persist()
    }

    pub fn set_resolution(&mut self, doc_id: impl Into<String>, tool_id: impl Into<String>) -> TraceResult<()> {
        let record = self.session.current_task_mut().ok_or(TraceError::NoOpenTask)?;
        record.doc_id = Some(doc_id.into());
        record.tool_id = Some(tool_id.into());
        self.persist()
    }

    pub fn begin_phase(&mut self, name: impl Into<String>) -> TraceResult<()> {
        let now = self.elapsed_ms();
        self.session.begin_phase(name, now).ok_or(TraceError::NoOpenTask)?;
        self.persist()
    }

    pub fn record_sub_step(&mut self, label: impl Into<String>, detail: serde_json::Value) -> TraceResult<()> {
        let now = self.elapsed_ms();
        let phase = self.session.current_phase_mut().ok_or(TraceError::NoOpenPhase)?;
        phase.sub_steps.push(crate::model::SubStep {
            label: label.into(),
            detail,
            at_ms: now,
        });
        self.persist()
    }

    pub fn end_phase(&mut self) -> TraceResult<()> {
        let now = self.elapsed_ms();
        self.session.end_phase(now).ok_or(TraceError::NoOpenPhase)?;
        self.persist()
    }

    pub fn end_task(&mut self, outcome: impl Into<String>) -> TraceResult<()> {
        let now = self.elapsed_ms();
        self.session.end_task(outcome, now).ok_or(TraceError::NoOpenTask)?;
        self.persist()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::task::TaskId;

    #[test]
    fn phases_and_sub_steps_nest_under_the_current_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_test.json");
        let mut writer = TraceWriter::create(&path, "session-1", Some("job-1".into())).unwrap();

        let task_id = TaskId::derive("do the thing", 0);
        writer.begin_task(task_id, "do the thing").unwrap();
        writer.set_resolution("doc-a", "tool-b").unwrap();
        writer.begin_phase("resolve").unwrap();
        writer.record_sub_step("lexical_match", serde_json::json!({"candidates": 2})).unwrap();
        writer.end_phase().unwrap();
        writer.end_task("completed").unwrap();

        let reloaded: Session = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(reloaded.records.len(), 1);
        let record = &reloaded.records[0];
        assert_eq!(record.doc_id.as_deref(), Some("doc-a"));
        assert_eq!(record.phases.len(), 1);
        assert_eq!(record.phases[0].sub_steps.len(), 1);
        assert_eq!(record.outcome.as_deref(), Some("completed"));
    }

    #[test]
    fn sub_step_without_open_phase_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_test2.json");
        let mut writer = TraceWriter::create(&path, "session-2", None).unwrap();
        writer.begin_task(TaskId::derive("x", 0), "x").unwrap();
        let err = writer.record_sub_step("oops", serde_json::json!(null)).unwrap_err();
        assert!(matches!(err, TraceError::NoOpenPhase));
    }
}
