//! Single-file `text -> embedding` cache (spec.md §6.1
//! `.cache/embeddings/<model>.json`).
//!
//! Grounded on `vector-store::embedding_cache`'s atomic temp+rename write
//! idiom, deliberately reduced from that crate's sharded binary format to
//! one JSON file per model, matching the literal filesystem layout spec.md
//! specifies.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub struct EmbeddingCache {
    path: PathBuf,
    entries: IndexMap<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn load_or_create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw).unwrap_or_default()
        } else {
            IndexMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, text: &str) -> Option<&Vec<f32>> {
        self.entries.get(text)
    }

    pub fn insert(&mut self, text: impl Into<String>, embedding: Vec<f32>) {
        self.entries.insert(text.into(), embedding);
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_save_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text-embedding-3-small.json");
        let mut cache = EmbeddingCache::load_or_create(&path).unwrap();
        cache.insert("hello", vec![0.1, 0.2, 0.3]);
        cache.save().unwrap();

        let reloaded = EmbeddingCache::load_or_create(&path).unwrap();
        assert_eq!(reloaded.get("hello"), Some(&vec![0.1, 0.2, 0.3]));
    }
}
