//! Pure string-template tool: fills `{var}` placeholders from its
//! parameters and returns the rendered text. No outbound I/O.

use crate::error::ToolResult;
use crate::tool::{Tool, ToolCallArgs};
use async_trait::async_trait;
use serde_json::Value;

pub struct TemplateFillTool;

#[async_trait]
impl Tool for TemplateFillTool {
    fn tool_id(&self) -> &str {
        "template_fill"
    }

    async fn execute(&self, params: &ToolCallArgs, _sop_doc_body: Option<&str>) -> ToolResult<Value> {
        let template = params.get("template").and_then(Value::as_str).unwrap_or_default();
        let mut rendered = template.to_string();
        for (key, value) in params {
            if key == "template" {
                continue;
            }
            let placeholder = format!("{{{key}}}");
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &replacement);
        }
        Ok(Value::String(rendered))
    }

    fn result_validation_hint(&self) -> String {
        "the template with every {var} placeholder substituted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[tokio::test]
    async fn fills_placeholders_from_params() {
        let tool = TemplateFillTool;
        let mut params = IndexMap::new();
        params.insert("template".to_string(), Value::String("hello {name}".to_string()));
        params.insert("name".to_string(), Value::String("world".to_string()));
        let result = tool.execute(&params, None).await.unwrap();
        assert_eq!(result, Value::String("hello world".to_string()));
    }
}
