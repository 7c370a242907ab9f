//! Hierarchical execution trace: `Session` -> `TaskExecutionRecord` ->
//! `Phase` -> sub-step, persisted incrementally to a single JSON file per
//! session (spec.md §5, grounded on `orchestrator_service/manager.py`'s
//! `traces/session_<timestamp>_<jobid[:8]>.json` naming and on the
//! teacher's atomic `status.json` write idiom).

mod error;
mod model;
mod writer;

pub use error::{TraceError, TraceResult};
pub use model::{Phase, Session, SubStep, TaskExecutionRecord};
pub use writer::TraceWriter;
