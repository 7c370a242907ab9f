//! Sub-tree compaction (spec.md §4.6): once a task's own output and its
//! still-completed descendants' outputs are visible in context, optionally
//! ask the model whether the original requirement is fully met and, if so,
//! collapse the sub-tree into one summarized artifact.

use crate::error::EngineRunResult;
use docflow_core::jsonpath;
use docflow_core::task::{GeneratedByPhase, PendingTask, Task, TaskId};
use docflow_core::{Context, EngineError};
use docflow_pathgen::SmartJsonPathGenerator;
use docflow_tools::llm::{ChatMessage, LlmClient, ToolDefinition};
use docflow_tools::ToolError;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// Descendant adjacency map keyed by parent task id, built from
/// `completed_tasks` (§9 design note: "Cycles in object graphs ... store
/// as adjacency map").
pub fn build_descendant_map(completed_tasks: &[Task]) -> HashMap<TaskId, Vec<TaskId>> {
    let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for task in completed_tasks {
        if let Some(parent) = task.parent_task_id {
            map.entry(parent).or_default().push(task.task_id);
        }
    }
    map
}

fn descendants_of(root: TaskId, adjacency: &HashMap<TaskId, Vec<TaskId>>) -> Vec<TaskId> {
    let mut out = Vec::new();
    let mut queue: Vec<TaskId> = adjacency.get(&root).cloned().unwrap_or_default();
    while let Some(id) = queue.pop() {
        out.push(id);
        if let Some(children) = adjacency.get(&id) {
            queue.extend(children.iter().copied());
        }
    }
    out
}

/// Outcome of one compaction attempt.
pub enum CompactionOutcome {
    /// Context was collapsed; `task.output_json_path`/`last_task_output`
    /// already point at the new artifact.
    Collapsed,
    /// Requirement not (yet) met; context is untouched. Push `follow_ups`
    /// ahead of default continuation.
    Unmet { follow_ups: Vec<PendingTask> },
}

/// spec.md §4.6. Returns `Unmet` with no follow-ups (a no-op) when `task`
/// has no completed descendants yet — a leaf task's own output alone has
/// nothing to compact.
pub async fn evaluate_and_summarize_subtree(
    client: &LlmClient,
    user_ask: &str,
    ctx: &mut Context,
    task: &mut Task,
    completed_tasks: &[Task],
    seq_start: u64,
) -> EngineRunResult<CompactionOutcome> {
    let adjacency = build_descendant_map(completed_tasks);
    let descendant_ids = descendants_of(task.task_id, &adjacency);
    if descendant_ids.is_empty() {
        return Ok(CompactionOutcome::Unmet { follow_ups: Vec::new() });
    }

    let by_id: HashMap<TaskId, &Task> = completed_tasks.iter().map(|t| (t.task_id, t)).collect();
    let mut subtree_outputs: IndexMap<String, Value> = IndexMap::new();
    for id in std::iter::once(task.task_id).chain(descendant_ids.iter().copied()) {
        let output_path = if id == task.task_id {
            task.output_json_path.as_ref()
        } else {
            by_id.get(&id).and_then(|t| t.output_json_path.as_ref())
        };
        if let Some(path) = output_path {
            if let Some(value) = jsonpath::resolve(ctx, path) {
                subtree_outputs.insert(path.clone(), value.clone());
            }
        }
    }

    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "requirements_met": {"type": "boolean"},
            "summary": {"type": "string"},
            "check_requirement_one_by_one": {"type": "string"},
            "deliverable_output_paths": {"type": "array", "items": {"type": "string"}},
            "missing_requirements": {"type": "array", "items": {"type": "string"}},
            "new_task_to_execute": {"type": "array", "items": {"type": "string"}},
        },
        "required": ["requirements_met", "check_requirement_one_by_one"],
    });
    let tool = ToolDefinition::new(
        "evaluate_and_summarize_subtree",
        "Check whether this task's completed sub-tree satisfies the original requirement, and if so summarize its outputs",
        schema,
    );
    let outputs_dump = serde_json::to_string(&subtree_outputs).unwrap_or_default();
    let prompt = format!(
        "User ask: {user_ask}\nTask: {}\nSub-tree outputs still in context: {outputs_dump}\n\
         Check each requirement one by one. If fully met, summarize the outputs into one artifact. \
         Otherwise list the missing requirements and any new tasks needed to satisfy them.",
        task.description
    );
    let outcome = client.chat_completion_with_fallback(&[ChatMessage::user(prompt)], std::slice::from_ref(&tool)).await?;

    let Some(call) = outcome.tool_calls.into_iter().next() else {
        return Ok(CompactionOutcome::Unmet { follow_ups: Vec::new() });
    };
    if call.function.name != "evaluate_and_summarize_subtree" {
        return Err(ToolError::UnexpectedToolCall {
            expected: "evaluate_and_summarize_subtree".to_string(),
            actual: call.function.name,
        }
        .into());
    }
    let args: Value = serde_json::from_str(&call.function.arguments)
        .map_err(|_| ToolError::NonJsonResponse { endpoint: "evaluate_and_summarize_subtree".to_string() })?;
    let requirements_met = args.get("requirements_met").and_then(Value::as_bool).unwrap_or(false);

    if requirements_met {
        let summary = args.get("summary").and_then(Value::as_str).unwrap_or_default().to_string();
        let artifact = serde_json::json!({ "summary": summary, "compacted_output": subtree_outputs });

        let generator = SmartJsonPathGenerator::new(client);
        let new_path = generator
            .generate_output_path(user_ask, &task.short_name, "summarized sub-tree compaction artifact", &artifact)
            .await?;

        for key in subtree_outputs.keys() {
            if let Some(top_key) = jsonpath::top_level_key(key) {
                ctx.remove(&top_key);
            }
        }
        jsonpath::write_top_level(ctx, &new_path, artifact.clone())
            .ok_or_else(|| EngineError::InputPathUnresolved { field: "compacted_output".to_string(), path: new_path.clone() })?;
        ctx.set_last_task_output(artifact);
        task.output_json_path = Some(new_path);
        Ok(CompactionOutcome::Collapsed)
    } else {
        let descriptions: Vec<String> = args
            .get("new_task_to_execute")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        let follow_ups = descriptions
            .into_iter()
            .filter(|d| !d.trim().is_empty())
            .enumerate()
            .map(|(i, description)| {
                PendingTask::child(description, task.task_id, seq_start + i as u64, GeneratedByPhase::SubtreeCompaction)
            })
            .collect();
        Ok(CompactionOutcome::Unmet { follow_ups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::task::{ToolBinding, TaskState};
    use indexmap::IndexMap as Map;

    fn leaf(task_id: TaskId, parent: Option<TaskId>) -> Task {
        Task {
            task_id,
            description: "leaf".to_string(),
            short_name: "leaf".to_string(),
            parent_task_id: parent,
            sop_doc_id: "doc".to_string(),
            tool: ToolBinding { tool_id: "tool".to_string(), parameters: Map::new() },
            input_json_path: Map::new(),
            output_json_path: None,
            output_description: None,
            skip_new_task_generation: true,
            requires_planning_metadata: false,
            state: TaskState::Completed,
            retries: 0,
        }
    }

    #[test]
    fn descendant_map_groups_children_by_parent() {
        let root = TaskId::derive("root", 0);
        let child_a = TaskId::derive("a", 1);
        let child_b = TaskId::derive("b", 2);
        let grandchild = TaskId::derive("c", 3);
        let tasks = vec![leaf(child_a, Some(root)), leaf(child_b, Some(root)), leaf(grandchild, Some(child_a))];
        let map = build_descendant_map(&tasks);
        let mut children = map.get(&root).cloned().unwrap_or_default();
        children.sort();
        let mut expected = vec![child_a, child_b];
        expected.sort();
        assert_eq!(children, expected);
        assert_eq!(map.get(&child_a), Some(&vec![grandchild]));
    }

    #[test]
    fn descendants_of_walks_full_subtree() {
        let root = TaskId::derive("root", 0);
        let child = TaskId::derive("child", 1);
        let grandchild = TaskId::derive("grandchild", 2);
        let tasks = vec![leaf(child, Some(root)), leaf(grandchild, Some(child))];
        let adjacency = build_descendant_map(&tasks);
        let mut found = descendants_of(root, &adjacency);
        found.sort();
        let mut expected = vec![child, grandchild];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn descendants_of_empty_for_leaf_task() {
        let root = TaskId::derive("root", 0);
        let adjacency = build_descendant_map(&[]);
        assert!(descendants_of(root, &adjacency).is_empty());
    }
}
