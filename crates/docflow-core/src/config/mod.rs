//! Configuration layer: environment-driven, alias-tolerant, grouped by
//! concern (grounded on `skilllite_core::config`).

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{load_dotenv, ScopedEnvGuard};
pub use schema::{EngineConfig, LlmConfig, ObservabilityConfig, OrchestratorConfig, PathsConfig, ResolverConfig};
