//! `SopResolver`: ties lexical matching, LLM disambiguation, and the
//! vector-search fallback together into the single `resolve` contract of
//! spec.md §4.3.

use crate::error::{ResolverError, ResolverResult};
use crate::lexical::{lexical_candidates, match_explicit_reference, LexicalCandidate};
use crate::vector::{merge_vector_results, VectorCandidate, VectorIndex};
use docflow_sop::Corpus;
use docflow_tools::llm::{ChatMessage, LlmClient, ToolDefinition};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRewriteMode {
    Off,
    Auto,
    Always,
}

pub struct Resolution {
    pub doc_id: String,
    /// Carried downstream when the selected doc is
    /// `tools/web_user_communicate` (spec.md §4.3 step 4).
    pub message_to_user: Option<String>,
}

pub struct SopResolver<'a> {
    corpus: &'a Corpus,
    client: &'a LlmClient,
    vector_index: Option<&'a VectorIndex>,
    top_k: usize,
    threshold: f64,
    query_rewrite_mode: QueryRewriteMode,
}

impl<'a> SopResolver<'a> {
    pub fn new(
        corpus: &'a Corpus,
        client: &'a LlmClient,
        vector_index: Option<&'a VectorIndex>,
        threshold: f64,
        query_rewrite_mode: QueryRewriteMode,
    ) -> Self {
        Self { corpus, client, vector_index, top_k: 5, threshold, query_rewrite_mode }
    }

    pub async fn resolve(&self, description: &str) -> ResolverResult<Resolution> {
        let doc_ids = self.corpus.list_doc_ids()?;
        let candidates = lexical_candidates(&doc_ids, description);

        if let Some(doc_id) = self.try_fast_path(&candidates, description) {
            return Ok(Resolution { doc_id, message_to_user: None });
        }

        if !candidates.is_empty() {
            if let Some(doc_id) = self.llm_disambiguate(description, &candidates).await? {
                return Ok(Resolution { doc_id, message_to_user: None });
            }
        }

        self.fallback_tool_selection(description, &doc_ids).await
    }

    fn try_fast_path(&self, candidates: &[LexicalCandidate], description: &str) -> Option<String> {
        if candidates.len() != 1 {
            return None;
        }
        let reference = match_explicit_reference(description)?;
        let candidate = &candidates[0];
        let filename = candidate.doc_id.rsplit('/').next().unwrap_or(&candidate.doc_id);
        let reference_norm = reference.trim_end_matches(".md").to_lowercase();
        if reference_norm == candidate.doc_id.to_lowercase() || reference_norm == filename.to_lowercase() {
            Some(candidate.doc_id.clone())
        } else {
            None
        }
    }

    async fn llm_disambiguate(&self, description: &str, candidates: &[LexicalCandidate]) -> ResolverResult<Option<String>> {
        let mut listing = String::new();
        for candidate in candidates {
            let doc = self.corpus.load(&candidate.doc_id)?;
            listing.push_str(&format!(
                "- id: {} | description: {} | aliases: {:?} | match: {:?}\n",
                doc.doc_id, doc.description, doc.aliases, candidate.match_kind
            ));
        }
        let prompt = format!(
            "Task description: {description}\nCandidate SOP documents:\n{listing}\n\
             Reply with exactly one line: <doc_id>X</doc_id> where X is one candidate id, or NONE."
        );
        let outcome = self.client.chat_completion(&[ChatMessage::user(prompt)], None).await?;
        let content = outcome.content.unwrap_or_default();
        let Some(doc_id) = doc_id_tag().captures(&content).map(|c| c.get(1).unwrap().as_str().to_string()) else {
            return Ok(None);
        };
        if doc_id == "NONE" {
            return Ok(None);
        }
        if candidates.iter().any(|c| c.doc_id == doc_id) {
            Ok(Some(doc_id))
        } else {
            Ok(None)
        }
    }

    async fn fallback_tool_selection(&self, description: &str, doc_ids: &[String]) -> ResolverResult<Resolution> {
        let vector_candidates = self.vector_candidates_with_rewrite(description).await?;

        let mut enum_values: Vec<String> = vector_candidates.iter().map(|c| c.doc_id.clone()).collect();
        for doc_id in doc_ids {
            if doc_id.starts_with("tools/") && !enum_values.contains(doc_id) {
                enum_values.push(doc_id.clone());
            }
        }
        if !enum_values.contains(&"general/plan".to_string()) {
            enum_values.push("general/plan".to_string());
        }

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "can_complete_with_tool": {"type": "boolean"},
                "selected_tool_doc": {"type": "string", "enum": enum_values},
                "reasoning": {"type": "string"},
                "message_to_user": {"type": "string"},
            },
            "required": ["can_complete_with_tool", "selected_tool_doc", "reasoning"],
        });
        let tool = ToolDefinition::new("select_tool_for_task", "Select the SOP document that best handles this task", schema);
        let prompt = format!("Task description: {description}\nChoose the best matching tool document from the constrained enum.");
        let outcome = self.client.chat_completion_with_fallback(&[ChatMessage::user(prompt)], std::slice::from_ref(&tool)).await?;

        let call = outcome
            .tool_calls
            .into_iter()
            .next()
            .ok_or_else(|| ResolverError::UnexpectedToolSelectionCall("<none>".to_string()))?;
        if call.function.name != "select_tool_for_task" {
            return Err(ResolverError::UnexpectedToolSelectionCall(call.function.name));
        }
        let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
        let selected = args
            .get("selected_tool_doc")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolverError::SelectedDocOutsideEnum("<missing>".to_string()))?
            .to_string();
        if !enum_values.contains(&selected) {
            return Err(ResolverError::SelectedDocOutsideEnum(selected));
        }
        let message_to_user = if selected == "tools/web_user_communicate" {
            args.get("message_to_user").and_then(Value::as_str).map(str::to_string)
        } else {
            None
        };
        Ok(Resolution { doc_id: selected, message_to_user })
    }

    async fn vector_candidates_with_rewrite(&self, description: &str) -> ResolverResult<Vec<VectorCandidate>> {
        let Some(index) = self.vector_index else {
            return Ok(Vec::new());
        };
        let original_embedding = self.client.embed(description).await?;
        let original_hits = index.query(&original_embedding, self.top_k);

        let top_score = original_hits.first().map(|c| c.score as f64).unwrap_or(0.0);
        let should_rewrite = match self.query_rewrite_mode {
            QueryRewriteMode::Off => false,
            QueryRewriteMode::Always => true,
            QueryRewriteMode::Auto => top_score < self.threshold,
        };
        if !should_rewrite {
            return Ok(original_hits);
        }

        let rewritten_query = self.rewrite_query(description).await?;
        let rewritten_embedding = self.client.embed(&rewritten_query).await?;
        let rewritten_hits = index.query(&rewritten_embedding, self.top_k);
        Ok(merge_vector_results(original_hits, rewritten_hits))
    }

    async fn rewrite_query(&self, description: &str) -> ResolverResult<String> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        });
        let tool = ToolDefinition::new("rewrite_sop_query", "Produce a 5-12 word SOP-style search query", schema);
        let prompt = format!("Task description: {description}\nRewrite it as a concise 5-12 word SOP-document search query.");
        let outcome = self.client.chat_completion_with_fallback(&[ChatMessage::user(prompt)], std::slice::from_ref(&tool)).await?;
        match outcome.tool_calls.into_iter().next() {
            Some(call) => {
                let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                Ok(args.get("query").and_then(Value::as_str).unwrap_or(description).to_string())
            }
            None => Ok(description.to_string()),
        }
    }
}

fn doc_id_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<doc_id>([^<]+)</doc_id>").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_id_tag_extracts_inner_value() {
        let caps = doc_id_tag().captures("some preamble <doc_id>tools/bash</doc_id> trailing").unwrap();
        assert_eq!(&caps[1], "tools/bash");
    }

    #[test]
    fn doc_id_tag_none_variant() {
        let caps = doc_id_tag().captures("<doc_id>NONE</doc_id>").unwrap();
        assert_eq!(&caps[1], "NONE");
    }
}
