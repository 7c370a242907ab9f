//! Planning-metadata formatting (spec.md §4.3 step 6, §4.1 step task
//! execution 3): available tool docs + vector candidates, rendered both
//! as XML-tagged markdown (for prompt injection) and as JSON.

use crate::vector::VectorCandidate;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct PlanningMetadata {
    pub available_tool_docs_xml: String,
    pub vector_tool_suggestions_xml: String,
    pub available_tool_docs_json: Value,
    pub vector_tool_suggestions_json: Value,
}

impl PlanningMetadata {
    pub fn build(available_tool_docs: &[(String, String)], vector_candidates: &[VectorCandidate]) -> Self {
        let available_tool_docs_xml = available_tool_docs
            .iter()
            .map(|(doc_id, description)| format!("<doc id=\"{doc_id}\">{description}</doc>"))
            .collect::<Vec<_>>()
            .join("\n");
        let vector_tool_suggestions_xml = vector_candidates
            .iter()
            .map(|c| format!("<candidate doc_id=\"{}\" score=\"{:.4}\"/>", c.doc_id, c.score))
            .collect::<Vec<_>>()
            .join("\n");

        let available_tool_docs_json = serde_json::json!(available_tool_docs
            .iter()
            .map(|(doc_id, description)| serde_json::json!({"doc_id": doc_id, "description": description}))
            .collect::<Vec<_>>());
        let vector_tool_suggestions_json = serde_json::json!(vector_candidates
            .iter()
            .map(|c| serde_json::json!({"doc_id": c.doc_id, "score": c.score}))
            .collect::<Vec<_>>());

        Self {
            available_tool_docs_xml,
            vector_tool_suggestions_xml,
            available_tool_docs_json,
            vector_tool_suggestions_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_xml_and_json_forms() {
        let docs = vec![("tools/bash".to_string(), "run a shell command".to_string())];
        let candidates = vec![VectorCandidate { doc_id: "general/plan".to_string(), score: 0.73 }];
        let metadata = PlanningMetadata::build(&docs, &candidates);
        assert!(metadata.available_tool_docs_xml.contains("tools/bash"));
        assert!(metadata.vector_tool_suggestions_xml.contains("general/plan"));
        assert_eq!(metadata.available_tool_docs_json[0]["doc_id"], "tools/bash");
    }
}
