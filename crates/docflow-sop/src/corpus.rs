//! Corpus enumeration and loading (spec.md §4.2).

use crate::document::SopDocument;
use crate::error::{SopError, SopResult};
use std::path::{Path, PathBuf};

pub struct Corpus {
    root: PathBuf,
}

impl Corpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Recursively scans the docs root for `*.md` files, returning corpus
    /// ids (directory prefix joined with `/`, extension stripped).
    pub fn list_doc_ids(&self) -> SopResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(id) = self.doc_id_for(path) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn doc_id_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let without_ext = relative.with_extension("");
        let id = without_ext
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Some(id)
    }

    pub fn load(&self, doc_id: &str) -> SopResult<SopDocument> {
        let path = self.root.join(format!("{doc_id}.md"));
        if !path.exists() {
            return Err(SopError::NotFound(doc_id.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        SopDocument::parse(doc_id, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_doc(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    const MINIMAL: &str = "---\ntool:\n  tool_id: shell\n---\nbody\n";

    #[test]
    fn lists_doc_ids_recursively_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "tools/bash.md", MINIMAL);
        write_doc(dir.path(), "general/plan.md", MINIMAL);
        let corpus = Corpus::new(dir.path());
        let mut ids = corpus.list_doc_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["general/plan".to_string(), "tools/bash".to_string()]);
    }

    #[test]
    fn load_missing_doc_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::new(dir.path());
        let err = corpus.load("missing/doc").unwrap_err();
        assert!(matches!(err, SopError::NotFound(_)));
    }

    #[test]
    fn load_round_trips_a_written_doc() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "tools/bash.md", MINIMAL);
        let corpus = Corpus::new(dir.path());
        let doc = corpus.load("tools/bash").unwrap();
        assert_eq!(doc.doc_id, "tools/bash");
        assert_eq!(doc.tool.tool_id, "shell");
    }
}
