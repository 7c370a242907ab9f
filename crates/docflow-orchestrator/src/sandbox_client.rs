//! HTTP client for the remote sandbox's whole-job lifecycle (spec.md §4.8
//! sandbox mode), generalized from `docflow_tools::tools::sandbox`'s
//! shell/code execution clients to session create/cancel/file-download.

use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SandboxClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone)]
pub struct SandboxSession {
    pub session_id: String,
    pub log_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxClientError {
    #[error("sandbox http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sandbox returned a non-JSON or malformed response")]
    MalformedResponse,
    #[error("sandbox returned status {0}: {1}")]
    BadStatus(u16, String),
}

pub type SandboxClientResult<T> = Result<T, SandboxClientError>;

impl SandboxClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// POST a create-session request carrying the runner command and its
    /// resolved environment; the remote sandbox starts the process and
    /// hands back a session id plus the path it is logging stdout to.
    pub async fn create_session(&self, command: &[String], env: &HashMap<String, String>) -> SandboxClientResult<SandboxSession> {
        let endpoint = format!("{}/v1/session/create", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "command": command, "env": env });
        let response = self.http.post(&endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SandboxClientError::BadStatus(status, text));
        }
        let parsed: Value = response.json().await.map_err(|_| SandboxClientError::MalformedResponse)?;
        let session_id = parsed
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or(SandboxClientError::MalformedResponse)?
            .to_string();
        let log_path = parsed.get("log_path").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(SandboxSession { session_id, log_path })
    }

    pub async fn cancel_session(&self, session_id: &str) -> SandboxClientResult<()> {
        let endpoint = format!("{}/v1/session/{session_id}/cancel", self.base_url.trim_end_matches('/'));
        let response = self.http.post(&endpoint).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SandboxClientError::BadStatus(status, text));
        }
        Ok(())
    }

    /// Download a file from the remote sandbox workdir via the file
    /// service (spec.md §6.4 `/v1/file/download`).
    pub async fn download_file(&self, remote_path: &str) -> SandboxClientResult<Bytes> {
        let endpoint = format!("{}/v1/file/download", self.base_url.trim_end_matches('/'));
        let response = self.http.get(&endpoint).query(&[("path", remote_path)]).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(SandboxClientError::BadStatus(status, text));
        }
        Ok(response.bytes().await?)
    }
}
