//! Explicit tracing wrapper around a [`Tool`] (REDESIGN FLAG resolution:
//! the teacher's dynamic `__getattr__`-style delegating wrapper becomes a
//! concrete struct that forwards through the `Tool` trait, rather than
//! anything reflective).

use crate::error::ToolResult;
use crate::tool::{Tool, ToolCallArgs};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Prompt/response pair an LLM-backed tool exposes for tracing.
#[derive(Debug, Clone)]
pub struct LlmCallDetail {
    pub prompt: String,
    pub response_text: Option<String>,
    pub native_tool_calls: Vec<crate::llm::ToolCall>,
    pub model: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_id: String,
    pub params: serde_json::Value,
    pub result: Result<serde_json::Value, String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct LlmCallRecord {
    pub prompt: String,
    pub response_text: Option<String>,
    pub native_tool_call_names: Vec<String>,
    pub model: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// Sink the engine/trace layer implements to receive call records as they
/// happen. Kept as a trait (rather than a concrete `docflow-trace`
/// dependency) so `docflow-tools` doesn't need to know about session/phase
/// structure.
pub trait TraceSink: Send + Sync {
    fn record_tool_call(&self, record: ToolCallRecord);
    fn record_llm_call(&self, record: LlmCallRecord);
}

pub struct TracedTool<T: Tool> {
    inner: T,
    sink: Arc<dyn TraceSink>,
}

impl<T: Tool> TracedTool<T> {
    pub fn new(inner: T, sink: Arc<dyn TraceSink>) -> Self {
        Self { inner, sink }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Tool> Tool for TracedTool<T> {
    fn tool_id(&self) -> &str {
        self.inner.tool_id()
    }

    async fn execute(&self, params: &ToolCallArgs, sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let started = Instant::now();
        let result = self.inner.execute(params, sop_doc_body).await;
        let duration_ms = started.elapsed().as_millis();

        self.sink.record_tool_call(ToolCallRecord {
            tool_id: self.inner.tool_id().to_string(),
            params: serde_json::to_value(params).unwrap_or(Value::Null),
            result: result.as_ref().map(Clone::clone).map_err(ToString::to_string),
            duration_ms,
        });

        if let Some(llm_call) = self.inner.take_last_llm_call() {
            self.sink.record_llm_call(LlmCallRecord {
                prompt: llm_call.prompt,
                response_text: llm_call.response_text,
                native_tool_call_names: llm_call.native_tool_calls.iter().map(|c| c.function.name.clone()).collect(),
                model: llm_call.model,
                prompt_tokens: llm_call.prompt_tokens,
                completion_tokens: llm_call.completion_tokens,
            });
        }

        result
    }

    fn result_validation_hint(&self) -> String {
        self.inner.result_validation_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use indexmap::IndexMap;
    use std::sync::Mutex;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn tool_id(&self) -> &str {
            "echo"
        }
        async fn execute(&self, params: &ToolCallArgs, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
            Ok(serde_json::to_value(params).unwrap())
        }
        fn result_validation_hint(&self) -> String {
            "echoes input".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        tool_calls: Mutex<Vec<ToolCallRecord>>,
        llm_calls: Mutex<Vec<LlmCallRecord>>,
    }

    impl TraceSink for RecordingSink {
        fn record_tool_call(&self, record: ToolCallRecord) {
            self.tool_calls.lock().unwrap().push(record);
        }
        fn record_llm_call(&self, record: LlmCallRecord) {
            self.llm_calls.lock().unwrap().push(record);
        }
    }

    #[tokio::test]
    async fn traced_tool_forwards_and_records() {
        let sink = Arc::new(RecordingSink::default());
        let traced = TracedTool::new(EchoTool, sink.clone());
        let mut params = IndexMap::new();
        params.insert("x".to_string(), serde_json::json!(1));
        let result = traced.execute(&params, None).await.unwrap();
        assert_eq!(result["x"], 1);
        assert_eq!(sink.tool_calls.lock().unwrap().len(), 1);
        assert!(sink.llm_calls.lock().unwrap().is_empty());
        assert_eq!(traced.tool_id(), "echo");
    }
}
