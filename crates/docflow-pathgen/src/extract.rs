//! The validated extraction DSL standing in for LLM-executed code
//! (spec.md §4.4, REDESIGN FLAG). An `ExtractOp` tree is synthesized by
//! the LLM (as structured output, not as code text) and evaluated here
//! deterministically against a fixed context.

use docflow_core::jsonpath;
use docflow_core::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum word count for a `Literal` leaf, mirroring the original
/// contract's "hard-coded literal (<50 words)" allowance.
pub const MAX_LITERAL_WORDS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ExtractOp {
    /// Read a JSON path directly out of context.
    DirectPath { path: String },
    /// A fixed value, capped at [`MAX_LITERAL_WORDS`] words when it is a
    /// string (enforced by [`ExtractOp::validate`]).
    Literal { value: Value },
    /// Apply a regex to the string produced by `source`, returning the
    /// numbered capture group.
    RegexCapture { source: Box<ExtractOp>, pattern: String, group: usize },
    /// String-concatenate the results of each part (non-string parts are
    /// stringified via their JSON representation minus quotes).
    Concat { parts: Vec<ExtractOp> },
    /// Build a JSON object from several named sub-extractions.
    Aggregate { fields: IndexMap<String, ExtractOp> },
    /// Explicit "nothing in the candidates satisfies this field" marker,
    /// replacing the `"<NOT_FOUND_IN_CANDIDATES>"` sentinel string.
    NotFound,
}

impl ExtractOp {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ExtractOp::Literal { value: Value::String(s) } => {
                let words = s.split_whitespace().count();
                if words > MAX_LITERAL_WORDS {
                    return Err(format!("literal has {words} words, exceeds the {MAX_LITERAL_WORDS}-word limit"));
                }
                Ok(())
            }
            ExtractOp::RegexCapture { source, pattern, .. } => {
                regex::Regex::new(pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
                source.validate()
            }
            ExtractOp::Concat { parts } => parts.iter().try_for_each(ExtractOp::validate),
            ExtractOp::Aggregate { fields } => fields.values().try_for_each(ExtractOp::validate),
            _ => Ok(()),
        }
    }
}

/// Result of evaluating an [`ExtractOp`]. Replaces the sentinel string
/// `"<NOT_FOUND_IN_CANDIDATES>"` with a tagged sum type.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found(Value),
    Missing,
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn evaluate(op: &ExtractOp, ctx: &Context) -> Extraction {
    match op {
        ExtractOp::DirectPath { path } => match jsonpath::resolve(ctx, path) {
            Some(value) => Extraction::Found(value.clone()),
            None => Extraction::Missing,
        },
        ExtractOp::Literal { value } => Extraction::Found(value.clone()),
        ExtractOp::NotFound => Extraction::Missing,
        ExtractOp::RegexCapture { source, pattern, group } => {
            let Extraction::Found(value) = evaluate(source, ctx) else {
                return Extraction::Missing;
            };
            let Ok(re) = regex::Regex::new(pattern) else {
                return Extraction::Missing;
            };
            let text = stringify(&value);
            match re.captures(&text).and_then(|caps| caps.get(*group)) {
                Some(m) => Extraction::Found(Value::String(m.as_str().to_string())),
                None => Extraction::Missing,
            }
        }
        ExtractOp::Concat { parts } => {
            let mut rendered = String::new();
            for part in parts {
                match evaluate(part, ctx) {
                    Extraction::Found(v) => rendered.push_str(&stringify(&v)),
                    Extraction::Missing => return Extraction::Missing,
                }
            }
            Extraction::Found(Value::String(rendered))
        }
        ExtractOp::Aggregate { fields } => {
            let mut object = serde_json::Map::new();
            for (key, sub_op) in fields {
                match evaluate(sub_op, ctx) {
                    Extraction::Found(v) => {
                        object.insert(key.clone(), v);
                    }
                    Extraction::Missing => return Extraction::Missing,
                }
            }
            Extraction::Found(Value::Object(object))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(key: &str, value: Value) -> Context {
        let mut ctx = Context::new();
        ctx.set(key, value);
        ctx
    }

    #[test]
    fn direct_path_found_and_missing() {
        let ctx = ctx_with("name", json!("ada"));
        assert_eq!(evaluate(&ExtractOp::DirectPath { path: "$.name".into() }, &ctx), Extraction::Found(json!("ada")));
        assert_eq!(evaluate(&ExtractOp::DirectPath { path: "$.missing".into() }, &ctx), Extraction::Missing);
    }

    #[test]
    fn not_found_always_missing() {
        let ctx = Context::new();
        assert_eq!(evaluate(&ExtractOp::NotFound, &ctx), Extraction::Missing);
    }

    #[test]
    fn regex_capture_extracts_group() {
        let ctx = ctx_with("line", json!("order id: ORD-4821"));
        let op = ExtractOp::RegexCapture {
            source: Box::new(ExtractOp::DirectPath { path: "$.line".into() }),
            pattern: r"ORD-(\d+)".into(),
            group: 1,
        };
        assert_eq!(evaluate(&op, &ctx), Extraction::Found(json!("4821")));
    }

    #[test]
    fn concat_joins_found_parts_and_propagates_missing() {
        let ctx = ctx_with("first", json!("a"));
        let ok = ExtractOp::Concat { parts: vec![ExtractOp::DirectPath { path: "$.first".into() }, ExtractOp::Literal { value: json!("b") }] };
        assert_eq!(evaluate(&ok, &ctx), Extraction::Found(json!("ab")));

        let missing = ExtractOp::Concat { parts: vec![ExtractOp::DirectPath { path: "$.absent".into() }] };
        assert_eq!(evaluate(&missing, &ctx), Extraction::Missing);
    }

    #[test]
    fn aggregate_builds_object_or_propagates_missing() {
        let ctx = ctx_with("a", json!(1));
        let mut fields = IndexMap::new();
        fields.insert("a".to_string(), ExtractOp::DirectPath { path: "$.a".into() });
        fields.insert("b".to_string(), ExtractOp::Literal { value: json!(2) });
        let op = ExtractOp::Aggregate { fields };
        assert_eq!(evaluate(&op, &ctx), Extraction::Found(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn literal_over_word_limit_fails_validation() {
        let long = "word ".repeat(60);
        let op = ExtractOp::Literal { value: json!(long) };
        assert!(op.validate().is_err());
    }
}
