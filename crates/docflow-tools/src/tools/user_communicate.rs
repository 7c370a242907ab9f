//! User interaction tools (spec.md §6.1 `user_comm/` layout).
//!
//! `UserCommunicateTool` blocks the task until a human drops a
//! `response.json` into the session directory; `WebUserCommunicateTool` is
//! the non-blocking variant used when the resolver selects
//! `tools/web_user_communicate` — it only hands a message downstream for
//! asynchronous delivery (e.g. a webhook), per the resolver's
//! `message_to_user` carry-through requirement.

use crate::error::{ToolError, ToolResult};
use crate::tool::{Tool, ToolCallArgs};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

pub struct UserCommunicateTool {
    sessions_root: PathBuf,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl UserCommunicateTool {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(3600),
        }
    }

    fn session_dir(&self, session: &str, task: &str) -> PathBuf {
        self.sessions_root.join(session).join(task)
    }
}

#[async_trait]
impl Tool for UserCommunicateTool {
    fn tool_id(&self) -> &str {
        "user_communicate"
    }

    async fn execute(&self, params: &ToolCallArgs, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let session = params.get("session").and_then(Value::as_str).unwrap_or("default");
        let task = params.get("task").and_then(Value::as_str).unwrap_or("task");
        let message = params.get("message").and_then(Value::as_str).unwrap_or_default();

        let dir = self.session_dir(session, task);
        tokio::fs::create_dir_all(dir.join("files")).await.map_err(|e| {
            ToolError::SandboxExecutionError(format!("could not create user_comm session dir: {e}"))
        })?;
        let index_html = format!("<html><body><p>{message}</p></body></html>");
        tokio::fs::write(dir.join("index.html"), index_html)
            .await
            .map_err(|e| ToolError::SandboxExecutionError(format!("could not write index.html: {e}")))?;

        let response_path = dir.join("response.json");
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            if response_path.exists() {
                let raw = tokio::fs::read_to_string(&response_path)
                    .await
                    .map_err(|e| ToolError::SandboxExecutionError(format!("could not read response.json: {e}")))?;
                return serde_json::from_str(&raw).map_err(|_| ToolError::NonJsonResponse { endpoint: "user_comm/response.json".to_string() });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ToolError::SandboxExecutionError("timed out waiting for user response".to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn result_validation_hint(&self) -> String {
        "the JSON object the user submitted via response.json".to_string()
    }
}

pub struct WebUserCommunicateTool;

#[async_trait]
impl Tool for WebUserCommunicateTool {
    fn tool_id(&self) -> &str {
        "web_user_communicate"
    }

    async fn execute(&self, params: &ToolCallArgs, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let message = params.get("message").and_then(Value::as_str).unwrap_or_default();
        Ok(serde_json::json!({ "message_to_user": message, "delivered": false }))
    }

    fn result_validation_hint(&self) -> String {
        "an object carrying message_to_user for asynchronous delivery".to_string()
    }
}
