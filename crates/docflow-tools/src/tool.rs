//! The tool contract every concrete tool implements (spec.md §4.7).

use crate::error::ToolResult;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

pub type ToolCallArgs = IndexMap<String, Value>;

#[async_trait]
pub trait Tool: Send + Sync {
    fn tool_id(&self) -> &str;

    /// `sop_doc_body` is the raw Markdown body of the governing SOP, made
    /// available to tools that template against it (e.g. the LLM tool
    /// reads its system prompt from a section).
    async fn execute(&self, params: &ToolCallArgs, sop_doc_body: Option<&str>) -> ToolResult<Value>;

    /// Text fed to downstream validator prompts describing what a
    /// successful result looks like for this tool.
    fn result_validation_hint(&self) -> String;

    /// LLM-backed tools record the prompt/response of their most recent
    /// call here so [`crate::traced::TracedTool`] can emit a dedicated
    /// `LLMCall` record alongside the `ToolCall` record. Non-LLM tools
    /// use the default `None`.
    fn take_last_llm_call(&self) -> Option<crate::traced::LlmCallDetail> {
        None
    }
}
