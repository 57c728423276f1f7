// tests/task_lifecycle.rs

use std::time::Duration;

use agentflow::dag::{DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT, Task, TaskDefaults, TaskSpec, TaskStatus};
use agentflow::errors::SchedulerError;
use agentflow::types::Capability;
use agentflow_test_utils::builders::TaskSpecBuilder;

fn task_with_retries(retries: u32) -> Task {
    let spec = TaskSpecBuilder::new("t1")
        .capability("nlp_to_sql")
        .retry_count(retries)
        .build();
    Task::create("p1", spec, &TaskDefaults::default()).unwrap()
}

#[test]
fn create_applies_defaults_and_starts_pending() {
    let task = Task::create("p1", TaskSpec::new("t1", "Translate"), &TaskDefaults::default())
        .unwrap();

    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.retry_count, DEFAULT_RETRY_COUNT);
    assert_eq!(task.retry_budget(), DEFAULT_RETRY_COUNT);
    assert_eq!(task.timeout, DEFAULT_TIMEOUT);
    assert_eq!(task.dispatch_attempts(), 0);
    assert_eq!(task.process_id, "p1");
    assert!(task.dispatched_at().is_none());
}

#[test]
fn create_rejects_empty_task_id() {
    let err = Task::create("p1", TaskSpec::new("  ", "blank"), &TaskDefaults::default())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ValidationError(_)));
}

#[test]
fn create_collapses_duplicate_capabilities_and_dependencies() {
    let spec = TaskSpecBuilder::new("t1")
        .capability("sql")
        .capability("nlp")
        .capability("sql")
        .after("a")
        .after("a")
        .timeout(Duration::from_secs(7))
        .build();
    let task = Task::create("p1", spec, &TaskDefaults::default()).unwrap();

    assert_eq!(task.capabilities, vec![Capability::new("sql"), Capability::new("nlp")]);
    assert_eq!(task.dependencies, vec!["a".to_string()]);
    assert_eq!(task.timeout, Duration::from_secs(7));
}

#[test]
fn happy_path_transitions() {
    let mut task = task_with_retries(1);
    task.transition(TaskStatus::InProgress).unwrap();
    task.transition(TaskStatus::Completed).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.is_terminal());
}

#[test]
fn failed_with_budget_goes_back_to_pending_and_decrements() {
    let mut task = task_with_retries(2);
    task.transition(TaskStatus::InProgress).unwrap();
    task.transition(TaskStatus::Failed).unwrap();

    assert!(task.is_retryable());
    assert!(!task.is_terminal());

    task.transition(TaskStatus::Pending).unwrap();
    assert_eq!(task.retry_budget(), 1);
    assert_eq!(task.status(), TaskStatus::Pending);
}

#[test]
fn failed_without_budget_is_terminal() {
    let mut task = task_with_retries(0);
    task.transition(TaskStatus::InProgress).unwrap();
    task.transition(TaskStatus::Failed).unwrap();

    assert!(task.is_terminal());
    assert!(!task.is_retryable());

    // FAILED -> FAILED is the only self-edge, and only at zero budget.
    task.transition(TaskStatus::Failed).unwrap();

    let err = task.transition(TaskStatus::Pending).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::InvalidTransition {
            from: TaskStatus::Failed,
            to: TaskStatus::Pending,
            ..
        }
    ));
    assert_eq!(task.retry_budget(), 0);
}

#[test]
fn failed_to_failed_rejected_while_budget_remains() {
    let mut task = task_with_retries(1);
    task.transition(TaskStatus::InProgress).unwrap();
    task.transition(TaskStatus::Failed).unwrap();

    assert!(task.transition(TaskStatus::Failed).is_err());
    assert_eq!(task.retry_budget(), 1);
}

#[test]
fn pause_and_resume_edges() {
    let mut task = task_with_retries(0);
    task.transition(TaskStatus::Paused).unwrap();
    task.transition(TaskStatus::Pending).unwrap();
    task.transition(TaskStatus::InProgress).unwrap();
    task.transition(TaskStatus::Paused).unwrap();
    task.transition(TaskStatus::Pending).unwrap();
    assert_eq!(task.status(), TaskStatus::Pending);
}

#[test]
fn edges_outside_the_state_machine_are_rejected() {
    use TaskStatus::*;

    let rejected = [
        (Pending, Completed),
        (Pending, Failed),
        (Pending, Pending),
        (Completed, Pending),
        (Completed, InProgress),
        (Completed, Failed),
        (Paused, InProgress),
        (Paused, Completed),
    ];

    for (from, to) in rejected {
        let mut task = task_with_retries(0);
        // Walk to `from` through legal edges.
        match from {
            Pending => {}
            Completed => {
                task.transition(InProgress).unwrap();
                task.transition(Completed).unwrap();
            }
            Paused => task.transition(Paused).unwrap(),
            _ => unreachable!(),
        }

        let err = task.transition(to).unwrap_err();
        match err {
            SchedulerError::InvalidTransition { from: f, to: t, .. } => {
                assert_eq!((f, t), (from, to));
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(task.status(), from, "status must not change on rejection");
    }
}

#[test]
fn status_renders_in_wire_form() {
    assert_eq!(TaskStatus::InProgress.to_string(), "IN_PROGRESS");
    assert_eq!(
        serde_json::to_string(&TaskStatus::Completed).unwrap(),
        "\"COMPLETED\""
    );
}

#[test]
fn idempotency_key_tracks_attempts() {
    let task = task_with_retries(0);
    assert_eq!(task.idempotency_key(), "t1:0");
}
