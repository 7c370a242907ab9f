//! Task state machine transition table (spec.md §4.1):
//! `Created -> InputsResolving -> ToolExecuting -> ContextUpdating ->
//! NewTaskGenerating -> Completed`, with `Failed` reachable from anywhere
//! except `Completed`, and only an `InputsResolving -> Failed` transition
//! being retryable.

use docflow_core::task::TaskState;

pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    match (from, to) {
        (Created, InputsResolving) => true,
        (InputsResolving, ToolExecuting) => true,
        (ToolExecuting, ContextUpdating) => true,
        (ContextUpdating, NewTaskGenerating) => true,
        (NewTaskGenerating, Completed) => true,
        (_, Failed) if from != Completed => true,
        _ => false,
    }
}

/// Only a failure while resolving inputs is recoverable; every other
/// `Failed` transition is terminal for the task.
pub fn is_retryable_failure(from: TaskState) -> bool {
    matches!(from, TaskState::InputsResolving)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::task::TaskState::*;

    #[test]
    fn happy_path_is_valid() {
        assert!(is_valid_transition(Created, InputsResolving));
        assert!(is_valid_transition(InputsResolving, ToolExecuting));
        assert!(is_valid_transition(ToolExecuting, ContextUpdating));
        assert!(is_valid_transition(ContextUpdating, NewTaskGenerating));
        assert!(is_valid_transition(NewTaskGenerating, Completed));
    }

    #[test]
    fn failed_reachable_from_any_non_terminal_state() {
        assert!(is_valid_transition(ToolExecuting, Failed));
        assert!(!is_valid_transition(Completed, Failed));
    }

    #[test]
    fn only_inputs_resolving_failure_is_retryable() {
        assert!(is_retryable_failure(InputsResolving));
        assert!(!is_retryable_failure(ToolExecuting));
    }
}
