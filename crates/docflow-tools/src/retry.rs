//! LLM tool retry machinery (spec.md §4.7): a sequence of retry
//! strategies, each given `(1 + max_retries)` attempts, checked against a
//! list of validators that reject a result by returning an error string.

use crate::error::{ToolError, ToolResult};
use crate::tool::{Tool, ToolCallArgs};
use serde_json::Value;

pub trait Validator: Send + Sync {
    fn validate(&self, result: &Value) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy)]
pub enum RetryStrategy {
    /// Reuse the original parameters verbatim.
    Simple,
    /// Append a structured "previous invalid response + validation error"
    /// hint under `_validation_hint`, which prompt-rendering tools fold
    /// into their template.
    AppendValidationHint,
}

impl RetryStrategy {
    /// Never mutates `base`; always returns a full, independent parameter
    /// map for this attempt.
    pub fn build_attempt_parameters(
        &self,
        base: &ToolCallArgs,
        previous_response: Option<&Value>,
        previous_error: Option<&str>,
    ) -> ToolCallArgs {
        let mut params = base.clone();
        if let (Self::AppendValidationHint, Some(error)) = (self, previous_error) {
            let hint = serde_json::json!({
                "previous_response": previous_response,
                "validation_error": error,
            });
            params.insert("_validation_hint".to_string(), hint);
        }
        params
    }
}

pub async fn execute_with_retries(
    tool: &dyn Tool,
    base_params: &ToolCallArgs,
    sop_doc_body: Option<&str>,
    strategies: &[RetryStrategy],
    max_retries: usize,
    validators: &[Box<dyn Validator>],
) -> ToolResult<Value> {
    let mut last_error = String::new();
    let mut last_response: Option<Value> = None;

    for strategy in strategies {
        for attempt in 0..=max_retries {
            let previous_error = if attempt == 0 { None } else { Some(last_error.as_str()) };
            let params = strategy.build_attempt_parameters(base_params, last_response.as_ref(), previous_error);
            let result = tool.execute(&params, sop_doc_body).await?;

            match validators.iter().find_map(|v| v.validate(&result).err()) {
                None => return Ok(result),
                Some(err) => {
                    last_error = err;
                    last_response = Some(result);
                }
            }
        }
    }

    Err(ToolError::ValidationExhausted(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        calls: AtomicUsize,
        succeed_on_call: usize,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn tool_id(&self) -> &str {
            "counting"
        }

        async fn execute(&self, _params: &IndexMap<String, Value>, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"call": call}))
        }

        fn result_validation_hint(&self) -> String {
            "must eventually succeed".to_string()
        }
    }

    struct SucceedsAtCall(usize);
    impl Validator for SucceedsAtCall {
        fn validate(&self, result: &Value) -> Result<(), String> {
            let call = result["call"].as_u64().unwrap() as usize;
            if call >= self.0 {
                Ok(())
            } else {
                Err(format!("call {call} too early"))
            }
        }
    }

    #[tokio::test]
    async fn retries_until_validator_passes() {
        let tool = CountingTool { calls: AtomicUsize::new(0), succeed_on_call: 2 };
        let result = execute_with_retries(
            &tool,
            &IndexMap::new(),
            None,
            &[RetryStrategy::Simple],
            3,
            &[Box::new(SucceedsAtCall(tool.succeed_on_call))],
        )
        .await
        .unwrap();
        assert_eq!(result["call"], 2);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_validation_exhausted() {
        let tool = CountingTool { calls: AtomicUsize::new(0), succeed_on_call: 100 };
        let err = execute_with_retries(&tool, &IndexMap::new(), None, &[RetryStrategy::Simple], 1, &[Box::new(SucceedsAtCall(100))])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ValidationExhausted(_)));
    }
}
