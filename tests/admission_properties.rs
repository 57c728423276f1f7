// tests/admission_properties.rs

use std::collections::HashSet;

use proptest::prelude::*;
use agentflow::dag::{ProcessState, ReportDisposition, ReportOutcome, TaskDefaults, TaskSpec, TaskStatus};
use agentflow::transport::DispatchMessage;
use agentflow_test_utils::builders::TaskSpecBuilder;
use agentflow_test_utils::router_with;
use serde_json::json;
use tokio::time::Instant;

// Task N may only depend on tasks 0..N-1, so every generated graph is acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<TaskSpec>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut deps: Vec<usize> = if i == 0 {
                        Vec::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    deps.sort_unstable();
                    deps.dedup();

                    let mut builder = TaskSpecBuilder::new(&format!("t{i}"))
                        .capability("work")
                        .retry_count(1);
                    for d in deps {
                        builder = builder.after(&format!("t{d}"));
                    }
                    builder.build()
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn admission_respects_dependencies_and_parallelism(
        specs in dag_strategy(10),
        max_parallel in 1..4usize,
        picks in proptest::collection::vec(any::<usize>(), 1..20),
        failing_first in proptest::collection::vec(0..10usize, 0..5),
    ) {
        let router = router_with(&[("work", "WorkQueue")]);
        let task_count = specs.len();
        let failing_first: HashSet<String> =
            failing_first.into_iter().map(|i| format!("t{i}")).collect();

        let mut process = ProcessState::new("p", max_parallel);
        process.register(specs, &TaskDefaults::default()).unwrap();

        let mut already_failed: HashSet<String> = HashSet::new();
        let mut in_flight: Vec<DispatchMessage> = Vec::new();
        let mut picks = picks.into_iter().cycle();
        let mut step = process.admit(&router, Instant::now());

        // Each task is dispatched at most twice, so this bound is never hit
        // unless the scheduler stalls or loops.
        for _ in 0..(task_count * 4 + 4) {
            prop_assert!(process.in_progress_count() <= max_parallel);
            prop_assert!(step.escalations.is_empty());

            for dispatch in &step.dispatches {
                let task_id = &dispatch.message.task.task_id;
                for dep in process.graph().dependencies_of(task_id) {
                    prop_assert_eq!(process.status_of(dep), Some(TaskStatus::Completed));
                }
            }
            in_flight.extend(step.dispatches.drain(..).map(|d| d.message));

            if in_flight.is_empty() {
                break;
            }

            let pick = picks.next().unwrap_or(0) % in_flight.len();
            let message = in_flight.remove(pick);
            let task_id = message.task.task_id.clone();

            let outcome = if failing_first.contains(&task_id)
                && already_failed.insert(task_id.clone())
            {
                ReportOutcome::Failed("transient".to_string())
            } else {
                ReportOutcome::Completed(json!(task_id))
            };

            let (disposition, applied) =
                process.apply_report(&task_id, Some(message.dispatch_attempt), outcome);
            prop_assert_eq!(disposition, ReportDisposition::Applied);
            prop_assert!(applied.escalations.is_empty());

            step = process.admit(&router, Instant::now());
        }

        prop_assert!(in_flight.is_empty());
        prop_assert!(process.is_finished());

        let completed = process.context().completed_tasks();
        prop_assert_eq!(completed.len(), task_count);
        for (position, task_id) in completed.iter().enumerate() {
            for dep in process.graph().dependencies_of(task_id) {
                let dep_position = completed.iter().position(|t| t == dep);
                prop_assert!(dep_position.is_some_and(|p| p < position));
            }
        }
    }
}
