//! HTTP sandbox executor tools (spec.md §6.4). The sandbox is always an
//! external collaborator reached over HTTP; there is no local isolation
//! code here (out of scope per the system overview).

use crate::error::{ToolError, ToolResult};
use crate::tool::{Tool, ToolCallArgs};
use async_trait::async_trait;
use serde_json::Value;

pub struct ShellSandboxTool {
    http: reqwest::Client,
    base_url: String,
}

impl ShellSandboxTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn get_str<'a>(params: &'a ToolCallArgs, key: &str) -> Option<&'a str> {
        params.get(key).and_then(Value::as_str)
    }
}

#[async_trait]
impl Tool for ShellSandboxTool {
    fn tool_id(&self) -> &str {
        "shell"
    }

    async fn execute(&self, params: &ToolCallArgs, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let endpoint = format!("{}/v1/shell/exec", self.base_url.trim_end_matches('/'));
        let command = Self::get_str(params, "command").unwrap_or_default();
        let body = serde_json::json!({
            "command": command,
            "id": Self::get_str(params, "id"),
            "exec_dir": Self::get_str(params, "exec_dir"),
            "async_mode": params.get("async_mode").and_then(Value::as_bool).unwrap_or(false),
            "timeout": params.get("timeout").and_then(Value::as_u64),
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| ToolError::Http { endpoint: endpoint.clone(), source })?;

        let status = response.status();
        let parsed: Value = response.json().await.map_err(|_| ToolError::NonJsonResponse { endpoint: endpoint.clone() })?;

        if !status.is_success() {
            return Ok(serde_json::json!({
                "stdout": "",
                "stderr": parsed.get("message").and_then(Value::as_str).unwrap_or("sandbox error"),
                "returncode": 1,
            }));
        }

        let data = parsed.get("data").cloned().unwrap_or(Value::Null);
        Ok(serde_json::json!({
            "stdout": data.get("output").cloned().unwrap_or(Value::String(String::new())),
            "console": data.get("console").cloned().unwrap_or(Value::Array(vec![])),
            "returncode": data.get("exit_code").cloned().unwrap_or(Value::from(0)),
        }))
    }

    fn result_validation_hint(&self) -> String {
        "a JSON object with stdout, console, and returncode==0 on success".to_string()
    }
}

pub struct PythonSandboxTool {
    http: reqwest::Client,
    base_url: String,
}

impl PythonSandboxTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl Tool for PythonSandboxTool {
    fn tool_id(&self) -> &str {
        "python"
    }

    async fn execute(&self, params: &ToolCallArgs, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let endpoint = format!("{}/v1/code/execute", self.base_url.trim_end_matches('/'));
        let code = params.get("code").and_then(Value::as_str).unwrap_or_default();
        let body = serde_json::json!({
            "language": "python",
            "code": code,
            "timeout": params.get("timeout").and_then(Value::as_u64),
        });

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|source| ToolError::Http { endpoint: endpoint.clone(), source })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::BadStatus { endpoint, status, body });
        }

        let parsed: Value = response.json().await.map_err(|_| ToolError::NonJsonResponse { endpoint: endpoint.clone() })?;
        let data = parsed.get("data").cloned().unwrap_or(Value::Null);
        if data.get("status").and_then(Value::as_str) == Some("error") {
            return Err(ToolError::SandboxExecutionError(
                data.get("outputs").map(|o| o.to_string()).unwrap_or_default(),
            ));
        }
        Ok(data)
    }

    fn result_validation_hint(&self) -> String {
        "a JSON object whose status is not \"error\"".to_string()
    }
}
