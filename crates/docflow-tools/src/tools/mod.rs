//! Concrete tool implementations (spec.md §4.7, §6.4).

mod llm_tool;
mod sandbox;
mod template_fill;
mod user_communicate;

pub use llm_tool::LlmTool;
pub use sandbox::{PythonSandboxTool, ShellSandboxTool};
pub use template_fill::TemplateFillTool;
pub use user_communicate::{UserCommunicateTool, WebUserCommunicateTool};
