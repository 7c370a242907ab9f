//! A single parsed SOP document (spec.md §3 `SOPDocument`, §4.2 loader).

use crate::error::{SopError, SopResult};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

fn front_matter_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)^---\s*\n(.*?)\n---\s*\n?").unwrap())
}

fn parameter_ref() -> &'static Regex {
    static REF: OnceLock<Regex> = OnceLock::new();
    REF.get_or_init(|| Regex::new(r"^\{parameters\.(.+)\}$").unwrap())
}

#[derive(Debug, Clone, Deserialize)]
struct RawTool {
    tool_id: Option<String>,
    #[serde(default)]
    parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FrontMatter {
    description: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    tool: Option<RawTool>,
    #[serde(default)]
    input_json_path: IndexMap<String, String>,
    output_json_path: Option<String>,
    input_description: Option<String>,
    output_description: Option<String>,
    #[serde(default)]
    requires_planning_metadata: bool,
    #[serde(default)]
    skip_new_task_generation: bool,
}

/// Resolved tool binding template: the tool id plus a parameter map whose
/// `{parameters.X}` references have already been rewritten to section
/// bodies.
#[derive(Debug, Clone)]
pub struct SopTool {
    pub tool_id: String,
    pub parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SopDocument {
    pub doc_id: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub tool: SopTool,
    pub input_json_path: IndexMap<String, String>,
    pub output_json_path: Option<String>,
    pub input_description: Option<String>,
    pub output_description: Option<String>,
    pub requires_planning_metadata: bool,
    pub skip_new_task_generation: bool,
    pub body: String,
    /// Level-2 section headings, keyed by trimmed title, in document order.
    pub sections: IndexMap<String, String>,
}

impl SopDocument {
    /// Parse raw SOP file contents. `doc_id` is the corpus-relative path
    /// (no extension) the file was loaded under; it is not itself part of
    /// the front matter (doc ids are positional, derived by the corpus
    /// scanner).
    pub fn parse(doc_id: &str, raw: &str) -> SopResult<Self> {
        let caps = front_matter_fence()
            .captures(raw)
            .ok_or_else(|| SopError::MissingFrontMatter { doc_id: doc_id.to_string() })?;
        let yaml = caps.get(1).unwrap().as_str();
        let body = raw[caps.get(0).unwrap().end()..].to_string();

        let front: FrontMatter = serde_yaml::from_str(yaml)
            .map_err(|source| SopError::InvalidFrontMatter { doc_id: doc_id.to_string(), source })?;

        let raw_tool = front.tool.ok_or_else(|| SopError::MissingTool { doc_id: doc_id.to_string() })?;
        let tool_id = raw_tool.tool_id.ok_or_else(|| SopError::MissingToolId { doc_id: doc_id.to_string() })?;

        let sections = parse_sections(doc_id, &body);
        let parameters = resolve_parameter_refs(doc_id, raw_tool.parameters, &sections);

        let aliases = normalize_aliases(doc_id, front.description.as_deref(), front.aliases);

        Ok(Self {
            doc_id: doc_id.to_string(),
            description: front.description.unwrap_or_default(),
            aliases,
            tool: SopTool { tool_id, parameters },
            input_json_path: front.input_json_path,
            output_json_path: front.output_json_path,
            input_description: front.input_description,
            output_description: front.output_description,
            requires_planning_metadata: front.requires_planning_metadata,
            skip_new_task_generation: front.skip_new_task_generation,
            body,
            sections,
        })
    }
}

/// `## Title` ... up to next `## ` or EOF. Titles are trimmed; a duplicate
/// title logs a warning and keeps the first occurrence (later sections
/// with the same canonical title are appended to it instead of being
/// dropped silently).
fn parse_sections(doc_id: &str, body: &str) -> IndexMap<String, String> {
    let mut sections: IndexMap<String, String> = IndexMap::new();
    let mut current: Option<String> = None;
    let mut buffer = String::new();

    let flush = |sections: &mut IndexMap<String, String>, current: &Option<String>, buffer: &mut String| {
        if let Some(title) = current {
            let content = buffer.trim().to_string();
            if let Some(existing) = sections.get_mut(title) {
                tracing::warn!(doc_id, title, "duplicate section title; appending content");
                existing.push('\n');
                existing.push_str(&content);
            } else {
                sections.insert(title.clone(), content);
            }
        }
        buffer.clear();
    };

    for line in body.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            flush(&mut sections, &current, &mut buffer);
            current = Some(title.trim().to_string());
        } else if current.is_some() {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }
    flush(&mut sections, &current, &mut buffer);
    sections
}

fn resolve_parameter_refs(
    doc_id: &str,
    parameters: IndexMap<String, String>,
    sections: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    parameters
        .into_iter()
        .map(|(key, value)| {
            if let Some(caps) = parameter_ref().captures(&value) {
                let section_title = caps.get(1).unwrap().as_str();
                match sections.get(section_title) {
                    Some(content) => (key, content.clone()),
                    None => {
                        tracing::warn!(doc_id, key, section_title, "{parameters.X} reference has no matching section");
                        (key, value)
                    }
                }
            } else {
                (key, value)
            }
        })
        .collect()
}

fn normalize_aliases(doc_id: &str, description: Option<&str>, aliases: Vec<String>) -> Vec<String> {
    let combo = description.map(|d| format!("{doc_id}: {d}"));
    let mut seen = std::collections::HashSet::new();
    aliases
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .filter(|a| a != doc_id)
        .filter(|a| combo.as_deref() != Some(a.as_str()))
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
description: "Run a shell command"
aliases:
  - "run a command"
tool:
  tool_id: shell
  parameters:
    command: "{parameters.Command Template}"
input_description: "the shell command to run"
output_description: "stdout and exit code"
---

## Command Template

echo {cmd}

## Notes

Timeout defaults to 30s.
"#;

    #[test]
    fn parses_front_matter_and_sections() {
        let doc = SopDocument::parse("tools/bash", SAMPLE).unwrap();
        assert_eq!(doc.tool.tool_id, "shell");
        assert_eq!(doc.tool.parameters["command"], "echo {cmd}");
        assert_eq!(doc.sections["Notes"], "Timeout defaults to 30s.");
        assert_eq!(doc.aliases, vec!["run a command".to_string()]);
    }

    #[test]
    fn missing_tool_id_is_a_load_error() {
        let raw = "---\ntool:\n  parameters: {}\n---\nbody";
        let err = SopDocument::parse("broken", raw).unwrap_err();
        assert!(matches!(err, SopError::MissingToolId { .. }));
    }

    #[test]
    fn missing_front_matter_is_a_load_error() {
        let err = SopDocument::parse("broken", "no fence here").unwrap_err();
        assert!(matches!(err, SopError::MissingFrontMatter { .. }));
    }

    #[test]
    fn unresolved_parameter_ref_falls_back_to_literal() {
        let raw = "---\ntool:\n  tool_id: x\n  parameters:\n    foo: \"{parameters.Missing}\"\n---\nbody";
        let doc = SopDocument::parse("d", raw).unwrap();
        assert_eq!(doc.tool.parameters["foo"], "{parameters.Missing}");
    }
}
