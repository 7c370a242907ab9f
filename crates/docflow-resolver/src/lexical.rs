//! Lexical candidate matching and the explicit-reference fast path
//! (spec.md §4.3 steps 1–2).

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    FullId,
    Filename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalCandidate {
    pub doc_id: String,
    pub match_kind: MatchKind,
}

fn is_too_generic(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

fn terminal_filename(doc_id: &str) -> &str {
    doc_id.rsplit('/').next().unwrap_or(doc_id)
}

fn word_boundary_contains(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let haystack_lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    let bytes = haystack_lower.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = haystack_lower[search_from..].find(&needle_lower) {
        let start = search_from + offset;
        let end = start + needle_lower.len();
        let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        search_from = start + 1;
    }
    false
}

/// Build the candidate set for a description: every `doc_id` whose full
/// id or terminal filename appears (word-boundary, case-insensitive) in
/// the description, skipping purely-alphanumeric (too generic) ids,
/// deduped by `doc_id`.
pub fn lexical_candidates(doc_ids: &[String], description: &str) -> Vec<LexicalCandidate> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for doc_id in doc_ids {
        if !is_too_generic(doc_id) && word_boundary_contains(description, doc_id) {
            if seen.insert(doc_id.clone()) {
                out.push(LexicalCandidate { doc_id: doc_id.clone(), match_kind: MatchKind::FullId });
            }
            continue;
        }
        let filename = terminal_filename(doc_id);
        if !is_too_generic(filename) && word_boundary_contains(description, filename) && seen.insert(doc_id.clone()) {
            out.push(LexicalCandidate { doc_id: doc_id.clone(), match_kind: MatchKind::Filename });
        }
    }
    out
}

fn explicit_reference_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)根据文档\s*([^\s,.，。]+)").unwrap(),
                Regex::new(r"(?i)根据\s*([^\s,.，。]+)").unwrap(),
                Regex::new(r"(?i)follow\s+([^\s,.]+)").unwrap(),
                Regex::new(r"!`([^`]+)`").unwrap(),
            ]
        })
        .as_slice()
}

/// Extract the id/filename token referenced by an explicit-reference
/// pattern, if the description contains one (spec.md §4.3 step 2).
pub fn match_explicit_reference(description: &str) -> Option<String> {
    explicit_reference_patterns()
        .iter()
        .find_map(|re| re.captures(description).map(|c| c.get(1).unwrap().as_str().trim_end_matches(['.', ',']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<String> {
        vec!["tools/bash".to_string(), "tools/python".to_string(), "general/plan".to_string(), "shell".to_string()]
    }

    #[test]
    fn matches_full_id_and_filename() {
        let candidates = lexical_candidates(&ids(), "Follow tools/bash, echo hi");
        assert!(candidates.iter().any(|c| c.doc_id == "tools/bash" && c.match_kind == MatchKind::FullId));
    }

    #[test]
    fn skips_purely_alphanumeric_generic_ids() {
        let candidates = lexical_candidates(&ids(), "please run shell now");
        assert!(!candidates.iter().any(|c| c.doc_id == "shell"));
    }

    #[test]
    fn matches_terminal_filename_when_full_id_absent() {
        let candidates = lexical_candidates(&ids(), "please run bash for me");
        assert!(candidates.iter().any(|c| c.doc_id == "tools/bash" && c.match_kind == MatchKind::Filename));
    }

    #[test]
    fn explicit_reference_follow_pattern() {
        assert_eq!(match_explicit_reference("Follow tools/bash.md, echo 'hello world'"), Some("tools/bash.md".to_string()));
    }

    #[test]
    fn explicit_reference_backtick_pattern() {
        assert_eq!(match_explicit_reference("!`tools/bash`"), Some("tools/bash".to_string()));
    }

    #[test]
    fn explicit_reference_chinese_patterns() {
        assert_eq!(match_explicit_reference("根据文档tools/bash执行"), Some("tools/bash".to_string()));
        assert_eq!(match_explicit_reference("根据 tools/bash 执行"), Some("tools/bash".to_string()));
    }

    #[test]
    fn no_explicit_reference_returns_none() {
        assert_eq!(match_explicit_reference("do something generic"), None);
    }
}
