//! Tool registration (spec.md §4.1 `register_tool`/`get_available_tools`).

use docflow_tools::Tool;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.tool_id().to_string(), tool);
    }

    pub fn get(&self, tool_id: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(tool_id)
    }

    pub fn available_tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.keys().cloned().collect();
        ids.sort();
        ids
    }
}
