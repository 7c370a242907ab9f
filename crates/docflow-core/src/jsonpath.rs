//! Minimal JSON-path resolution over [`Context`] (spec.md §3).
//!
//! Only the subset of JSONPath the path generator actually emits is
//! supported: `$.key`, `$.['key with spaces']`, and dotted/bracketed
//! chains into nested objects and arrays (`$.foo.bar`, `$.items[0].name`).
//! This is deliberately not a general JSONPath engine.

use crate::context::Context;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse(path: &str) -> Option<Vec<Segment>> {
    let rest = path.strip_prefix("$.").or_else(|| path.strip_prefix('$'))?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();
    let mut current = String::new();

    fn flush(current: &mut String, segments: &mut Vec<Segment>) {
        if !current.is_empty() {
            segments.push(Segment::Key(std::mem::take(current)));
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);
                let mut inner = String::new();
                for c2 in chars.by_ref() {
                    if c2 == ']' {
                        break;
                    }
                    inner.push(c2);
                }
                let trimmed = inner.trim().trim_matches(|c| c == '\'' || c == '"');
                if let Ok(idx) = trimmed.parse::<usize>() {
                    segments.push(Segment::Index(idx));
                } else {
                    segments.push(Segment::Key(trimmed.to_string()));
                }
            }
            other => current.push(other),
        }
    }
    flush(&mut current, &mut segments);
    Some(segments)
}

/// Resolve a JSON path against context. Returns `None` if any segment in
/// the chain is absent — this is the signal the engine's recovery loop
/// reacts to as a missing input.
pub fn resolve<'a>(ctx: &'a Context, path: &str) -> Option<&'a Value> {
    let mut segments = parse(path)?.into_iter();
    let first = match segments.next()? {
        Segment::Key(k) => ctx.get(&k)?,
        Segment::Index(_) => return None,
    };
    segments.try_fold(first, |value, segment| match segment {
        Segment::Key(k) => value.get(&k),
        Segment::Index(i) => value.get(i),
    })
}

/// Write `value` into context at a *top-level* path (`$.foo` or
/// `$.['foo bar']`); nested writes are not needed by any operation in
/// spec.md and are intentionally unsupported.
pub fn write_top_level(ctx: &mut Context, path: &str, value: Value) -> Option<()> {
    let segments = parse(path)?;
    if segments.len() != 1 {
        return None;
    }
    match &segments[0] {
        Segment::Key(k) => {
            ctx.set(k.clone(), value);
            Some(())
        }
        Segment::Index(_) => None,
    }
}

/// Extract the bare context key from a top-level path (`$.foo` ->
/// `Some("foo")`); `None` for multi-segment paths. Used by sub-tree
/// compaction to remove the keys it's about to fold into one artifact.
pub fn top_level_key(path: &str) -> Option<String> {
    let segments = parse(path)?;
    if segments.len() != 1 {
        return None;
    }
    match &segments[0] {
        Segment::Key(k) => Some(k.clone()),
        Segment::Index(_) => None,
    }
}

/// Execution-prefix rewrite: when a sub-tree is compacted, its output keys
/// are renamed `$.foo` -> `$.msg<n>_foo` so sibling branches can't collide
/// on bare names. Only rewrites the leading key segment.
pub fn apply_execution_prefix(path: &str, prefix: &str) -> Option<String> {
    let segments = parse(path)?;
    let mut rebuilt = String::from("$.");
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Key(k) if i == 0 => rebuilt.push_str(&format!("{prefix}{k}")),
            Segment::Key(k) => rebuilt.push_str(&format!(".{k}")),
            Segment::Index(idx) => rebuilt.push_str(&format!("[{idx}]")),
        }
    }
    Some(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_context() -> Context {
        let mut ctx = Context::new();
        ctx.set("plain", json!("hello"));
        ctx.set("with spaces", json!(42));
        ctx.set("nested", json!({"inner": {"value": "deep"}}));
        ctx.set("items", json!([{"name": "first"}, {"name": "second"}]));
        ctx
    }

    #[test]
    fn resolves_plain_key() {
        let ctx = sample_context();
        assert_eq!(resolve(&ctx, "$.plain"), Some(&json!("hello")));
    }

    #[test]
    fn resolves_bracketed_key_with_spaces() {
        let ctx = sample_context();
        assert_eq!(resolve(&ctx, "$.['with spaces']"), Some(&json!(42)));
    }

    #[test]
    fn resolves_nested_dotted_path() {
        let ctx = sample_context();
        assert_eq!(resolve(&ctx, "$.nested.inner.value"), Some(&json!("deep")));
    }

    #[test]
    fn resolves_array_index() {
        let ctx = sample_context();
        assert_eq!(resolve(&ctx, "$.items[1].name"), Some(&json!("second")));
    }

    #[test]
    fn missing_key_resolves_to_none() {
        let ctx = sample_context();
        assert_eq!(resolve(&ctx, "$.absent"), None);
        assert_eq!(resolve(&ctx, "$.nested.missing.value"), None);
    }

    #[test]
    fn execution_prefix_only_rewrites_leading_segment() {
        let rewritten = apply_execution_prefix("$.foo.bar", "msg3_").unwrap();
        assert_eq!(rewritten, "$.msg3_foo.bar");
    }

    #[test]
    fn top_level_key_rejects_multi_segment_paths() {
        assert_eq!(top_level_key("$.foo"), Some("foo".to_string()));
        assert_eq!(top_level_key("$.['with spaces']"), Some("with spaces".to_string()));
        assert_eq!(top_level_key("$.foo.bar"), None);
    }
}
