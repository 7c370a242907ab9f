//! OpenAI-compatible chat-completions + embeddings client (grounded on
//! `skilllite_agent::llm::LlmClient`), including the XML tool-call
//! fallback required by spec.md §4.7.

use crate::error::{ToolError, ToolResult};
use docflow_core::config::LlmConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDef,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function",
            function: FunctionDef { name: name.into(), description: description.into(), parameters },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Result of one chat-completion round: text content, any native tool
/// calls, and token usage if the backend reported it.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("reqwest client builds with a static config");
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> ToolResult<CompletionOutcome> {
        let endpoint = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
        });
        if let Some(tools) = tools {
            body["tools"] = serde_json::to_value(tools).map_err(|_| ToolError::NonJsonResponse { endpoint: endpoint.clone() })?;
        }

        let response = self.send(&endpoint, &body).await?;
        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|_| ToolError::NonJsonResponse { endpoint: endpoint.clone() })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::NoToolCall("empty choices array".to_string()))?;
        Ok(CompletionOutcome {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls,
            usage: parsed.usage,
        })
    }

    /// §4.7 "LLM fallback for tool calls": when `tools` were supplied but
    /// the model answered with plain text, re-ask with an instruction to
    /// reply as `<function_name>{json}</function_name>` and parse that out.
    pub async fn chat_completion_with_fallback(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> ToolResult<CompletionOutcome> {
        let outcome = self.chat_completion(messages, Some(tools)).await?;
        if !outcome.tool_calls.is_empty() {
            return Ok(outcome);
        }

        let schema_hint = tools
            .iter()
            .map(|t| format!("- {}: {}", t.function.name, t.function.description))
            .collect::<Vec<_>>()
            .join("\n");
        let mut retry_messages = messages.to_vec();
        retry_messages.push(ChatMessage::user(format!(
            "Reply with exactly one of the following tool calls, formatted as \
             <function_name>{{json arguments}}</function_name>:\n{schema_hint}"
        )));
        let retry_outcome = self.chat_completion(&retry_messages, None).await?;
        let content = retry_outcome
            .content
            .clone()
            .ok_or_else(|| ToolError::NoToolCall("fallback reply had no content".to_string()))?;
        let tool_call = parse_xml_tool_call(&content)
            .ok_or_else(|| ToolError::NoToolCall("fallback reply did not match <name>{json}</name>".to_string()))?;
        Ok(CompletionOutcome { content: None, tool_calls: vec![tool_call], usage: retry_outcome.usage })
    }

    pub async fn embed(&self, input: &str) -> ToolResult<Vec<f32>> {
        let endpoint = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "input": input,
        });
        let response = self.send(&endpoint, &body).await?;
        let parsed: EmbeddingResponse =
            response.json().await.map_err(|_| ToolError::NonJsonResponse { endpoint: endpoint.clone() })?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ToolError::NoToolCall("embeddings response had no data".to_string()))
    }

    async fn send(&self, endpoint: &str, body: &Value) -> ToolResult<reqwest::Response> {
        let mut request = self.http.post(endpoint).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|source| ToolError::Http { endpoint: endpoint.to_string(), source })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::BadStatus { endpoint: endpoint.to_string(), status, body });
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn xml_tool_call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<(\w+)>(\{.*?\})</\1>").unwrap())
}

fn parse_xml_tool_call(content: &str) -> Option<ToolCall> {
    let caps = xml_tool_call_pattern().captures(content)?;
    let name = caps.get(1)?.as_str().to_string();
    let arguments = caps.get(2)?.as_str().to_string();
    Some(ToolCall {
        id: format!("fallback-{}", uuid::Uuid::new_v4()),
        call_type: "function".to_string(),
        function: FunctionCall { name, arguments },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_tool_call_extracts_name_and_json() {
        let content = "here is my answer <select_tool_for_task>{\"selected_tool_doc\":\"general/plan\"}</select_tool_for_task>";
        let call = parse_xml_tool_call(content).unwrap();
        assert_eq!(call.function.name, "select_tool_for_task");
        assert_eq!(call.function.arguments, "{\"selected_tool_doc\":\"general/plan\"}");
    }

    #[test]
    fn xml_tool_call_absent_returns_none() {
        assert!(parse_xml_tool_call("no tags here").is_none());
    }
}
