//! `SmartJsonPathGenerator`: dispatches between the three synthesis modes
//! described in spec.md §4.4.

use crate::error::{PathgenError, PathgenResult};
use crate::extract::{evaluate, ExtractOp, Extraction};
use docflow_core::context::SchemaEntry;
use docflow_core::jsonpath;
use docflow_core::Context;
use docflow_tools::llm::{ChatMessage, LlmClient, ToolDefinition};
use indexmap::IndexMap;
use serde_json::Value;

pub use SchemaEntry as CandidateSchemaEntry;

/// Below this size, narrowing the schema down to LLM-chosen candidates
/// before code synthesis isn't worth the extra round trip.
const SMALL_SCHEMA_CHAR_LIMIT: usize = 1000;
const SMALL_SCHEMA_ENTRY_LIMIT: usize = 10;

pub struct SmartJsonPathGenerator<'a> {
    client: &'a LlmClient,
}

impl<'a> SmartJsonPathGenerator<'a> {
    pub fn new(client: &'a LlmClient) -> Self {
        Self { client }
    }

    fn schema_is_small(schema: &[SchemaEntry]) -> bool {
        schema.len() < SMALL_SCHEMA_ENTRY_LIMIT
            && serde_json::to_string(schema).map(|s| s.len() < SMALL_SCHEMA_CHAR_LIMIT).unwrap_or(false)
    }

    /// 1-input, one-by-one synthesis (§4.4 first bullet).
    pub async fn generate_input_path(
        &self,
        ctx: &mut Context,
        user_ask: &str,
        task_short_name: &str,
        field: &str,
        field_description: &str,
        meaning: &dyn Fn(&str) -> Option<String>,
    ) -> PathgenResult<String> {
        let schema = ctx.type_schema(meaning);
        let candidates = self.candidate_analysis(user_ask, task_short_name, field_description, &schema).await?;
        let op = self.synthesize_extraction(user_ask, field_description, &candidates).await?;
        op.validate().map_err(PathgenError::MalformedLlmResponse)?;

        match evaluate(&op, ctx) {
            Extraction::Missing => Err(PathgenError::InputMissing { field: field.to_string(), description: field_description.to_string() }),
            Extraction::Found(value) => Ok(ctx.store_temp_input(value)),
        }
    }

    /// ≥2-inputs batch synthesis (§4.4 second bullet): one candidate pass
    /// covering every field, one extraction op per field.
    pub async fn generate_input_paths_batch(
        &self,
        ctx: &mut Context,
        user_ask: &str,
        task_short_name: &str,
        fields: &IndexMap<String, String>,
        meaning: &dyn Fn(&str) -> Option<String>,
    ) -> PathgenResult<IndexMap<String, String>> {
        let schema = ctx.type_schema(meaning);
        let combined_description = fields
            .iter()
            .map(|(name, desc)| format!("{name}: {desc}"))
            .collect::<Vec<_>>()
            .join("; ");
        let candidates = self.candidate_analysis(user_ask, task_short_name, &combined_description, &schema).await?;

        let mut result = IndexMap::new();
        for (field, description) in fields {
            let op = self.synthesize_extraction(user_ask, description, &candidates).await?;
            op.validate().map_err(PathgenError::MalformedLlmResponse)?;
            match evaluate(&op, ctx) {
                Extraction::Missing => {
                    return Err(PathgenError::InputMissing { field: field.clone(), description: description.clone() })
                }
                Extraction::Found(value) => {
                    result.insert(field.clone(), ctx.store_temp_input(value));
                }
            }
        }
        Ok(result)
    }

    /// Output-path synthesis (§4.4 third bullet). A missing tool call in
    /// the response is non-fatal and defaults to `$.output`.
    pub async fn generate_output_path(
        &self,
        user_ask: &str,
        task_short_name: &str,
        output_description: &str,
        tool_output: &Value,
    ) -> PathgenResult<String> {
        let schema_def = serde_json::json!({
            "type": "object",
            "properties": { "output_path": { "type": "string" } },
            "required": ["output_path"],
        });
        let tool = ToolDefinition::new("generate_output_path", "Choose a snake_case top-level context key for this output", schema_def);

        let prompt = format!(
            "User ask: {user_ask}\nTask: {task_short_name}\nOutput description: {output_description}\nTool output: {tool_output}\n\
             Propose a snake_case key rooted at $. with no nested segments."
        );
        let messages = [ChatMessage::user(prompt)];
        let outcome = self.client.chat_completion_with_fallback(&messages, std::slice::from_ref(&tool)).await?;

        let Some(call) = outcome.tool_calls.into_iter().next() else {
            return Ok("$.output".to_string());
        };
        if call.function.name != "generate_output_path" {
            return Err(PathgenError::MalformedLlmResponse(format!(
                "expected generate_output_path, got {}",
                call.function.name
            )));
        }
        let args: Value = serde_json::from_str(&call.function.arguments)
            .map_err(|e| PathgenError::MalformedLlmResponse(format!("invalid arguments JSON: {e}")))?;
        let path = args
            .get("output_path")
            .and_then(Value::as_str)
            .ok_or_else(|| PathgenError::MalformedLlmResponse("missing output_path".to_string()))?;
        let normalized = if path.starts_with("$.") { path.to_string() } else { format!("$.{path}") };
        Ok(normalized)
    }

    async fn candidate_analysis(
        &self,
        user_ask: &str,
        task_short_name: &str,
        field_description: &str,
        schema: &[SchemaEntry],
    ) -> PathgenResult<Vec<(String, Value)>> {
        let schema_json = if Self::schema_is_small(schema) {
            serde_json::to_string(schema).unwrap_or_default()
        } else {
            serde_json::to_string(&schema.iter().take(SMALL_SCHEMA_ENTRY_LIMIT).collect::<Vec<_>>()).unwrap_or_default()
        };
        let prompt = format!(
            "User ask: {user_ask}\nTask: {task_short_name}\nField needed: {field_description}\nContext schema: {schema_json}\n\
             Reply with a JSON array of candidate JSON-paths (e.g. [\"$.foo\", \"$.bar.baz\"])."
        );
        let messages = [ChatMessage::user(prompt)];
        let outcome = self.client.chat_completion(&messages, None).await?;
        let content = outcome
            .content
            .ok_or_else(|| PathgenError::MalformedLlmResponse("candidate analysis returned no content".to_string()))?;
        let paths: Vec<String> = serde_json::from_str(&content)
            .map_err(|e| PathgenError::MalformedLlmResponse(format!("candidate analysis did not return a JSON array: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        Ok(paths
            .into_iter()
            .filter_map(|p| {
                // Caller resolves candidates against the *live* context in
                // `synthesize_extraction`'s prompt only, not here — dedup is
                // by path string, duplicate *values* are deduped downstream
                // once the generator evaluates them.
                if seen.insert(p.clone()) {
                    Some((p, Value::Null))
                } else {
                    None
                }
            })
            .collect())
    }

    async fn synthesize_extraction(
        &self,
        user_ask: &str,
        field_description: &str,
        candidates: &[(String, Value)],
    ) -> PathgenResult<ExtractOp> {
        let candidate_paths: Vec<&str> = candidates.iter().map(|(p, _)| p.as_str()).collect();
        let schema_def = serde_json::json!({
            "type": "object",
            "description": "An ExtractOp tree: {\"op\":\"direct_path\",\"path\":...} | literal | regex_capture | concat | aggregate | not_found",
        });
        let tool = ToolDefinition::new(
            "synthesize_extraction",
            "Return an ExtractOp describing how to derive the field from the candidate paths",
            schema_def,
        );
        let prompt = format!(
            "User ask: {user_ask}\nField needed: {field_description}\nCandidate paths: {candidate_paths:?}\n\
             Return an ExtractOp tree. Use \"not_found\" if nothing in the candidates satisfies the field."
        );
        let messages = [ChatMessage::user(prompt)];
        let outcome = self.client.chat_completion_with_fallback(&messages, std::slice::from_ref(&tool)).await?;

        let Some(call) = outcome.tool_calls.into_iter().next() else {
            return Ok(ExtractOp::NotFound);
        };
        serde_json::from_str(&call.function.arguments)
            .map_err(|e| PathgenError::MalformedLlmResponse(format!("invalid ExtractOp JSON: {e}")))
    }
}

/// Execution-prefix rewrite re-exported for callers that only need the
/// pure path helper without a generator instance.
pub fn apply_execution_prefix(path: &str, prefix: &str) -> Option<String> {
    jsonpath::apply_execution_prefix(path, prefix)
}
