//! SOP document model and corpus loader (spec.md §4.2), grounded on
//! `skilllite_core::skill::metadata`'s front-matter/body split: a regex
//! fence finds the YAML block, `serde_yaml` deserializes it, and the rest
//! of the file is the Markdown body.

mod corpus;
mod document;
mod error;

pub use corpus::Corpus;
pub use document::{SopDocument, SopTool};
pub use error::{SopError, SopResult};
