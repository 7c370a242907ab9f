//! Shared workspace state: an insertion-order-preserving JSON map.
//!
//! Grounded on the §9 design note ("Context should be a concrete
//! ordered-map type that preserves insertion order and JSON-encodes
//! without reordering"). `indexmap` gives us that without hand-rolling an
//! ordered map, matching the corpus's preference for a real crate over a
//! bespoke structure.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Prefix marking a key as transient: lifetime is one task execution.
pub const TEMP_INPUT_PREFIX: &str = "_temp_input_";

/// Conventional key holding the description of the task being resolved.
pub const CURRENT_TASK_KEY: &str = "current_task";

/// Conventional key refreshed after every task execution.
pub const LAST_TASK_OUTPUT_KEY: &str = "last_task_output";

/// Set when the engine stops because it hit `EngineConfig::max_tasks`
/// (spec.md §4.1 step 2) — a graceful stop, not a failure.
pub const MAX_TASKS_REACHED_KEY: &str = "max_tasks_reached";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context(IndexMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn set_current_task(&mut self, description: &str) {
        self.set(CURRENT_TASK_KEY, Value::String(description.to_string()));
    }

    pub fn set_last_task_output(&mut self, value: Value) {
        self.set(LAST_TASK_OUTPUT_KEY, value);
    }

    pub fn set_max_tasks_reached(&mut self) {
        self.set(MAX_TASKS_REACHED_KEY, Value::Bool(true));
    }

    /// Allocate a fresh `_temp_input_<uuid>` key and store `value` under it.
    /// Returns the JSON path `$.['<key>']` pointing at it.
    pub fn store_temp_input(&mut self, value: Value) -> String {
        let key = format!("{TEMP_INPUT_PREFIX}{}", uuid::Uuid::new_v4().simple());
        self.set(key.clone(), value);
        format!("$.['{key}']")
    }

    /// Invariant (spec.md §8): after each `execute_task`, no `_temp_input_*`
    /// key remains in context.
    pub fn clear_temp_inputs(&mut self) {
        let stale: Vec<String> = self
            .0
            .keys()
            .filter(|k| k.starts_with(TEMP_INPUT_PREFIX))
            .cloned()
            .collect();
        for key in stale {
            self.0.shift_remove(&key);
        }
    }

    pub fn has_temp_inputs(&self) -> bool {
        self.0.keys().any(|k| k.starts_with(TEMP_INPUT_PREFIX))
    }

    /// Atomic save: write to a sibling temp file then rename over the
    /// destination, matching the teacher's `status.json` persistence idiom
    /// (`skilllite-core` callers never see a half-written file).
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(std::io::Error::other)
    }

    /// Build a compact type-schema view of context for path-generator
    /// prompts, excluding transient keys. `meaning` optionally annotates a
    /// key with a human label (e.g. from `task_short_name_map`).
    pub fn type_schema(&self, meaning: &dyn Fn(&str) -> Option<String>) -> Vec<SchemaEntry> {
        self.0
            .iter()
            .filter(|(k, _)| !k.starts_with(TEMP_INPUT_PREFIX))
            .map(|(k, v)| SchemaEntry {
                key: k.clone(),
                type_name: json_type_name(v).to_string(),
                meaning: meaning(k),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaEntry {
    pub key: String,
    pub type_name: String,
    pub meaning: Option<String>,
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_input_cleanup_leaves_no_trace() {
        let mut ctx = Context::new();
        ctx.store_temp_input(Value::String("a".into()));
        ctx.store_temp_input(Value::String("b".into()));
        ctx.set("kept", Value::Bool(true));
        assert!(ctx.has_temp_inputs());
        ctx.clear_temp_inputs();
        assert!(!ctx.has_temp_inputs());
        assert_eq!(ctx.get("kept"), Some(&Value::Bool(true)));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        let mut ctx = Context::new();
        ctx.set("z", Value::from(1));
        ctx.set("a", Value::from(2));
        ctx.save_to_file(&path).unwrap();
        let loaded = Context::load_from_file(&path).unwrap();
        let keys_before: Vec<_> = ctx.keys().collect();
        let keys_after: Vec<_> = loaded.keys().collect();
        assert_eq!(keys_before, keys_after, "insertion order must survive a round trip");
    }

    #[test]
    fn schema_excludes_temp_keys() {
        let mut ctx = Context::new();
        ctx.store_temp_input(Value::from(1));
        ctx.set("visible", Value::from("x"));
        let schema = ctx.type_schema(&|_| None);
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].key, "visible");
    }
}
