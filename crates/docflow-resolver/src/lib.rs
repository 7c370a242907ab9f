//! SOP resolution (spec.md §4.3): lexical candidate matching with an
//! explicit-reference fast path, LLM disambiguation, and an
//! embedding-backed vector-search fallback with optional query rewrite.

mod embedding_cache;
mod error;
mod lexical;
mod planning;
mod resolver;
mod vector;

pub use embedding_cache::EmbeddingCache;
pub use error::{ResolverError, ResolverResult};
pub use lexical::{lexical_candidates, match_explicit_reference, LexicalCandidate, MatchKind};
pub use planning::PlanningMetadata;
pub use resolver::{QueryRewriteMode, Resolution, SopResolver};
pub use vector::{VectorCandidate, VectorIndex};
