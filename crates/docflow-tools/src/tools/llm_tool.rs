//! The general-purpose LLM tool (spec.md §4.7), grounded on
//! `skilllite_agent::llm::LlmClient`.

use crate::error::{ToolError, ToolResult};
use crate::llm::{ChatMessage, LlmClient};
use crate::tool::{Tool, ToolCallArgs};
use crate::traced::LlmCallDetail;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

pub struct LlmTool {
    client: LlmClient,
    last_call: Mutex<Option<LlmCallDetail>>,
}

impl LlmTool {
    pub fn new(client: LlmClient) -> Self {
        Self { client, last_call: Mutex::new(None) }
    }

    fn render_prompt(params: &ToolCallArgs) -> String {
        let mut prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();
        if let Some(hint) = params.get("_validation_hint") {
            prompt.push_str(&format!(
                "\n\nYour previous response was rejected: {}\nPrevious response: {}",
                hint.get("validation_error").and_then(Value::as_str).unwrap_or(""),
                hint.get("previous_response").map(|v| v.to_string()).unwrap_or_default(),
            ));
        }
        prompt
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn tool_id(&self) -> &str {
        "llm"
    }

    async fn execute(&self, params: &ToolCallArgs, sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let prompt = Self::render_prompt(params);
        let mut messages = Vec::new();
        if let Some(system) = sop_doc_body {
            messages.push(ChatMessage::system(system.to_string()));
        }
        messages.push(ChatMessage::user(prompt.clone()));

        let outcome = self.client.chat_completion(&messages, None).await?;

        *self.last_call.lock().unwrap() = Some(LlmCallDetail {
            prompt,
            response_text: outcome.content.clone(),
            native_tool_calls: outcome.tool_calls.clone(),
            model: self.client.model().to_string(),
            prompt_tokens: outcome.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: outcome.usage.as_ref().map(|u| u.completion_tokens),
        });

        outcome
            .content
            .map(Value::String)
            .ok_or_else(|| ToolError::NoToolCall("LLM returned neither content nor tool calls".to_string()))
    }

    fn result_validation_hint(&self) -> String {
        "a non-empty text response addressing the prompt".to_string()
    }

    fn take_last_llm_call(&self) -> Option<LlmCallDetail> {
        self.last_call.lock().unwrap().take()
    }
}
