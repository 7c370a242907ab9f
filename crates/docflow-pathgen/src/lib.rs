//! JSON-path synthesis (spec.md §4.4).
//!
//! REDESIGN FLAG resolved here: rather than executing an LLM-generated
//! Python-like `extract_func(context)` body, candidate analysis is
//! followed by code *synthesis* into a small validated [`ExtractOp`] DSL,
//! which this crate evaluates deterministically. The sentinel string
//! `"<NOT_FOUND_IN_CANDIDATES>"` becomes the tagged [`Extraction`] enum.

mod error;
mod extract;
mod generator;

pub use error::{PathgenError, PathgenResult};
pub use extract::{evaluate, ExtractOp, Extraction};
pub use generator::{CandidateSchemaEntry, SmartJsonPathGenerator};
