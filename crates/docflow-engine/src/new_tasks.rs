//! New-task generation (spec.md §4.5): after a task's context update, ask
//! the model what follow-up tasks (if any) its output implies, then give
//! the whole batch distinct short names in one extra pass.

use docflow_core::task::{GeneratedByPhase, PendingTask, TaskId};
use docflow_tools::llm::{ChatMessage, LlmClient, ToolDefinition};
use docflow_tools::{ToolError, ToolResult};
use serde_json::Value;

pub async fn extract_new_tasks(
    client: &LlmClient,
    user_ask: &str,
    parent_task_id: TaskId,
    parent_description: &str,
    tool_output: &Value,
    seq_start: u64,
) -> ToolResult<Vec<PendingTask>> {
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "think_process": {"type": "string"},
            "tasks": {"type": "array", "items": {"type": "string"}},
        },
        "required": ["tasks"],
    });
    let tool = ToolDefinition::new(
        "extract_new_tasks",
        "List follow-up task descriptions this completed task's output implies, or an empty list if none",
        schema,
    );
    let prompt = format!(
        "User ask: {user_ask}\nCompleted task: {parent_description}\nTool output: {tool_output}\n\
         Decide whether this output implies any new follow-up tasks. Return an empty list if it doesn't."
    );
    let outcome = client
        .chat_completion_with_fallback(&[ChatMessage::user(prompt)], std::slice::from_ref(&tool))
        .await?;

    let Some(call) = outcome.tool_calls.into_iter().next() else {
        return Ok(Vec::new());
    };
    if call.function.name != "extract_new_tasks" {
        return Err(ToolError::UnexpectedToolCall { expected: "extract_new_tasks".to_string(), actual: call.function.name });
    }
    let descriptions = parse_task_descriptions(&call.function.arguments)?;
    Ok(pending_tasks_from_descriptions(descriptions, parent_task_id, seq_start))
}

fn parse_task_descriptions(raw_arguments: &str) -> ToolResult<Vec<String>> {
    let args: Value = serde_json::from_str(raw_arguments)
        .map_err(|_| ToolError::NonJsonResponse { endpoint: "extract_new_tasks".to_string() })?;
    Ok(args
        .get("tasks")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default())
}

fn pending_tasks_from_descriptions(
    descriptions: Vec<String>,
    parent_task_id: TaskId,
    seq_start: u64,
) -> Vec<PendingTask> {
    descriptions
        .into_iter()
        .filter(|d| !d.trim().is_empty())
        .enumerate()
        .map(|(i, description)| {
            PendingTask::child(description, parent_task_id, seq_start + i as u64, GeneratedByPhase::NewTaskGeneration)
        })
        .collect()
}

/// Batch-assigns short, human-readable names to newly generated tasks in
/// one pass, so siblings spawned from the same parent don't collide on
/// generic placeholder labels. A missing or malformed response just keeps
/// each task's placeholder name — never fatal.
pub async fn assign_short_names(client: &LlmClient, tasks: &mut [PendingTask], existing_short_names: &[String]) -> ToolResult<()> {
    if tasks.is_empty() {
        return Ok(());
    }
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "assignments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"},
                        "short_name": {"type": "string"},
                    },
                    "required": ["task_id", "short_name"],
                },
            },
        },
        "required": ["assignments"],
    });
    let tool = ToolDefinition::new("assign_short_names", "Assign a short, distinct snake_case name to each task id", schema);
    let listing = tasks
        .iter()
        .map(|t| format!("- {}: {}", t.task_id.as_hex(), t.description))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Existing short names in use: {existing_short_names:?}\nNew tasks:\n{listing}\n\
         Assign each a short, distinct snake_case name that doesn't collide with the existing ones."
    );
    let outcome = client
        .chat_completion_with_fallback(&[ChatMessage::user(prompt)], std::slice::from_ref(&tool))
        .await?;

    let Some(call) = outcome.tool_calls.into_iter().next() else {
        return Ok(());
    };
    if call.function.name != "assign_short_names" {
        return Ok(());
    }
    let Ok(assignments) = parse_short_name_assignments(&call.function.arguments) else {
        return Ok(());
    };
    apply_short_name_assignments(tasks, &assignments);
    Ok(())
}

fn parse_short_name_assignments(raw_arguments: &str) -> Result<Vec<(String, String)>, serde_json::Error> {
    let args: Value = serde_json::from_str(raw_arguments)?;
    let assignments = args
        .get("assignments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let task_id = entry.get("task_id")?.as_str()?.to_string();
            let short_name = entry.get("short_name")?.as_str()?.to_string();
            Some((task_id, short_name))
        })
        .collect();
    Ok(assignments)
}

fn apply_short_name_assignments(tasks: &mut [PendingTask], assignments: &[(String, String)]) {
    for (task_id_hex, short_name) in assignments {
        if let Some(task) = tasks.iter_mut().find(|t| t.task_id.as_hex() == *task_id_hex) {
            task.short_name = short_name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::task::PendingTask;

    #[test]
    fn empty_and_blank_descriptions_are_dropped() {
        let parent = PendingTask::root("parent", 0);
        let tasks = pending_tasks_from_descriptions(
            vec!["do a thing".to_string(), "".to_string(), "   ".to_string(), "do another".to_string()],
            parent.task_id,
            10,
        );
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].description, "do a thing");
        assert_eq!(tasks[1].description, "do another");
        assert_eq!(tasks[0].generated_by_phase, Some(GeneratedByPhase::NewTaskGeneration));
        assert_eq!(tasks[0].parent_task_id, Some(parent.task_id));
    }

    #[test]
    fn generated_task_ids_are_stable_for_same_seq() {
        let parent = PendingTask::root("parent", 0);
        let a = pending_tasks_from_descriptions(vec!["x".to_string()], parent.task_id, 5);
        let b = pending_tasks_from_descriptions(vec!["x".to_string()], parent.task_id, 5);
        assert_eq!(a[0].task_id, b[0].task_id);
    }

    #[test]
    fn parses_task_descriptions_from_arguments_json() {
        let descriptions = parse_task_descriptions(r#"{"tasks":["a","b"]}"#).unwrap();
        assert_eq!(descriptions, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn applies_matching_assignments_and_ignores_unknown_ids() {
        let parent = PendingTask::root("parent", 0);
        let mut tasks = pending_tasks_from_descriptions(vec!["a".to_string(), "b".to_string()], parent.task_id, 0);
        let known_id = tasks[0].task_id.as_hex();
        apply_short_name_assignments(
            &mut tasks,
            &[(known_id, "renamed".to_string()), ("deadbeefdeadbeef".to_string(), "ignored".to_string())],
        );
        assert_eq!(tasks[0].short_name, "renamed");
    }
}
