// tests/runtime.rs

use std::sync::Arc;
use std::time::Duration;

use agentflow::engine::{Runtime, RuntimeEvent, RuntimeOptions, Scheduler};
use agentflow::transport::{
    ChannelTransport, JsonLinesTransport, WorkerReport, spawn_line_reader, spawn_outbound_pump,
};
use agentflow_test_utils::builders::{SubmissionBuilder, TaskSpecBuilder, settings};
use agentflow_test_utils::recording_transport::RecordingTransport;
use agentflow_test_utils::{init_tracing, router_with, with_timeout};
use serde_json::{Value, json};
use tokio::sync::mpsc;

const ROUTES: &[(&str, &str)] = &[
    ("nlp_to_sql", "QueryAgentQueue"),
    ("database_operations", "SQLAgentQueue"),
];

fn options() -> RuntimeOptions {
    RuntimeOptions {
        sweep_interval: Duration::from_millis(50),
        exit_when_idle: true,
    }
}

#[tokio::test]
async fn diamond_runs_to_completion_with_auto_completing_agents() {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel(64);
    let transport = Arc::new(RecordingTransport::auto_completing(rt_tx.clone()));
    let (out_tx, _pump) = spawn_outbound_pump(transport.clone());
    let scheduler = Scheduler::new(
        settings(4, 0, Duration::from_secs(30)),
        Arc::new(router_with(ROUTES)),
        out_tx,
    );

    rt_tx
        .send(RuntimeEvent::Submit(
            SubmissionBuilder::new("p1")
                .task(TaskSpecBuilder::new("A").capability("nlp_to_sql"))
                .task(TaskSpecBuilder::new("B").capability("database_operations").after("A"))
                .task(TaskSpecBuilder::new("C").capability("nlp_to_sql").after("A"))
                .task(
                    TaskSpecBuilder::new("D")
                        .capability("database_operations")
                        .after("B")
                        .after("C"),
                )
                .build(),
        ))
        .await
        .unwrap();

    with_timeout(Runtime::new(scheduler.clone(), rt_rx, options()).run())
        .await
        .unwrap();

    let ids = transport.dispatched_task_ids();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids.first().map(String::as_str), Some("A"));
    assert_eq!(ids.last().map(String::as_str), Some("D"));

    let addresses: Vec<String> = transport
        .dispatched()
        .iter()
        .map(|(a, _)| a.to_string())
        .collect();
    assert_eq!(addresses[0], "QueryAgentQueue");
    assert_eq!(addresses[3], "SQLAgentQueue");

    let ctx = scheduler.context("p1").await.unwrap();
    assert_eq!(ctx.len(), 4);
    assert_eq!(ctx.get_result("D"), Some(&json!({"done": "D"})));
    assert!(transport.escalations().is_empty());
}


#[tokio::test]
async fn rejected_submission_does_not_stop_the_loop() {
    let (rt_tx, rt_rx) = mpsc::channel(64);
    let transport = Arc::new(RecordingTransport::auto_completing(rt_tx.clone()));
    let (out_tx, _pump) = spawn_outbound_pump(transport.clone());
    let scheduler = Scheduler::new(
        settings(4, 0, Duration::from_secs(30)),
        Arc::new(router_with(ROUTES)),
        out_tx,
    );

    rt_tx
        .send(RuntimeEvent::Submit(
            SubmissionBuilder::new("cyclic")
                .task(TaskSpecBuilder::new("X").capability("nlp_to_sql").after("Y"))
                .task(TaskSpecBuilder::new("Y").capability("nlp_to_sql").after("X"))
                .build(),
        ))
        .await
        .unwrap();
    rt_tx
        .send(RuntimeEvent::Submit(
            SubmissionBuilder::new("p1")
                .task(TaskSpecBuilder::new("A").capability("nlp_to_sql"))
                .build(),
        ))
        .await
        .unwrap();

    with_timeout(Runtime::new(scheduler.clone(), rt_rx, options()).run())
        .await
        .unwrap();

    assert_eq!(scheduler.process_ids(), vec!["p1".to_string()]);
    assert_eq!(transport.dispatched_task_ids(), vec!["A".to_string()]);
}

#[tokio::test]
async fn channel_broker_retries_a_flaky_agent() {
    init_tracing();

    let (broker, mut escalations) = ChannelTransport::new();
    let mut query_queue = broker.register_queue("QueryAgentQueue");
    let broker = Arc::new(broker);

    let (rt_tx, rt_rx) = mpsc::channel(64);
    let (out_tx, _pump) = spawn_outbound_pump(broker.clone());
    let scheduler = Scheduler::new(
        settings(2, 1, Duration::from_secs(30)),
        Arc::new(router_with(ROUTES)),
        out_tx,
    );

    // Fails "b" on its first attempt, completes everything else.
    let agent_tx = rt_tx.clone();
    let agent = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(msg) = query_queue.recv().await {
            seen.push((msg.task.task_id.clone(), msg.dispatch_attempt));
            let report = if msg.task.task_id == "b" && msg.dispatch_attempt == 1 {
                WorkerReport::failed(msg.task.task_id.clone(), "model overloaded")
            } else {
                WorkerReport::completed(msg.task.task_id.clone(), json!(msg.dispatch_attempt))
            };
            let report = report
                .in_process(msg.process_id.clone())
                .for_attempt(msg.dispatch_attempt);
            if agent_tx.send(RuntimeEvent::Report(report)).await.is_err() {
                break;
            }
        }
        seen
    });

    rt_tx
        .send(RuntimeEvent::Submit(
            SubmissionBuilder::new("p1")
                .task(TaskSpecBuilder::new("a").capability("nlp_to_sql"))
                .task(TaskSpecBuilder::new("b").capability("nlp_to_sql").after("a"))
                .build(),
        ))
        .await
        .unwrap();
    drop(rt_tx);

    with_timeout(Runtime::new(scheduler.clone(), rt_rx, options()).run())
        .await
        .unwrap();

    let ctx = scheduler.context("p1").await.unwrap();
    assert_eq!(ctx.completed_tasks(), ["a".to_string(), "b".to_string()]);
    assert_eq!(ctx.get_result("b"), Some(&json!(2)));
    assert!(escalations.try_recv().is_err());

    // Once the pump lets go of the broker, the agent's queue closes.
    drop(scheduler);
    drop(broker);
    let seen = with_timeout(agent).await.unwrap();
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), 1),
            ("b".to_string(), 1),
            ("b".to_string(), 2)
        ]
    );
}

#[tokio::test]
async fn exhausted_task_is_escalated_and_dependents_fail() {
    let (broker, mut escalations) = ChannelTransport::new();
    let mut sql_queue = broker.register_queue("SQLAgentQueue");
    let broker = Arc::new(broker);

    let (rt_tx, rt_rx) = mpsc::channel(64);
    let (out_tx, _pump) = spawn_outbound_pump(broker.clone());
    let scheduler = Scheduler::new(
        settings(2, 0, Duration::from_secs(30)),
        Arc::new(router_with(ROUTES)),
        out_tx,
    );

    let agent_tx = rt_tx.clone();
    tokio::spawn(async move {
        while let Some(msg) = sql_queue.recv().await {
            let report = WorkerReport::failed(msg.task.task_id.clone(), "syntax error")
                .in_process(msg.process_id.clone());
            if agent_tx.send(RuntimeEvent::Report(report)).await.is_err() {
                break;
            }
        }
    });

    rt_tx
        .send(RuntimeEvent::Submit(
            SubmissionBuilder::new("p1")
                .task(TaskSpecBuilder::new("run").capability("database_operations"))
                .task(
                    TaskSpecBuilder::new("report")
                        .capability("database_operations")
                        .after("run"),
                )
                .build(),
        ))
        .await
        .unwrap();

    with_timeout(Runtime::new(scheduler.clone(), rt_rx, options()).run())
        .await
        .unwrap();

    let summary = scheduler.summary("p1").await.unwrap();
    assert_eq!(summary.failed, 2);
    assert!(summary.finished);

    let escalation = with_timeout(escalations.recv()).await.unwrap();
    assert_eq!(escalation.task_id, "run");
    assert_eq!(escalation.process_id, "p1");
    assert_eq!(escalation.error, "syntax error");
    assert!(escalations.try_recv().is_err());
}

#[tokio::test]
async fn json_lines_round_trip_through_the_runtime() {
    init_tracing();

    let input: &'static [u8] = br#"
{"type":"submit","process_id":"p1","tasks":[{"task_id":"a","task_name":"Translate","capabilities":"nlp_to_sql"},{"task_id":"b","task_name":"Run","capabilities":["database_operations"],"dependencies":["a"]}]}
this line is not json
{"type":"report","task_id":"a","status":"COMPLETED","result":{"sql":"SELECT 1"}}
{"type":"report","task_id":"b","process_id":"p1","status":"COMPLETED","result":[1]}
"#;

    let transport = Arc::new(JsonLinesTransport::new(Vec::<u8>::new(), "failures"));
    let (out_tx, pump) = spawn_outbound_pump(transport.clone());
    let scheduler = Scheduler::new(
        settings(4, 0, Duration::from_secs(30)),
        Arc::new(router_with(ROUTES)),
        out_tx,
    );

    let (rt_tx, rt_rx) = mpsc::channel(64);
    let reader = spawn_line_reader(input, rt_tx);

    with_timeout(Runtime::new(scheduler, rt_rx, options()).run())
        .await
        .unwrap();
    with_timeout(pump).await.unwrap();
    with_timeout(reader).await.unwrap();

    let Ok(transport) = Arc::try_unwrap(transport) else {
        panic!("transport still shared after the pump finished");
    };
    let output = String::from_utf8(transport.into_inner()).unwrap();
    let lines: Vec<Value> = output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "dispatch");
    assert_eq!(lines[0]["address"], "QueryAgentQueue");
    assert_eq!(lines[0]["message"]["task"]["task_id"], "a");
    assert_eq!(lines[0]["message"]["idempotency_key"], "a:1");
    assert_eq!(lines[1]["address"], "SQLAgentQueue");
    assert_eq!(lines[1]["message"]["task"]["dependencies"], json!(["a"]));
}

#[tokio::test]
async fn shutdown_event_stops_a_busy_runtime() {
    let (rt_tx, rt_rx) = mpsc::channel(8);
    let transport = Arc::new(RecordingTransport::new());
    let (out_tx, _pump) = spawn_outbound_pump(transport.clone());
    let scheduler = Scheduler::new(
        settings(1, 0, Duration::from_secs(30)),
        Arc::new(router_with(ROUTES)),
        out_tx,
    );

    rt_tx
        .send(RuntimeEvent::Submit(
            SubmissionBuilder::new("p1")
                .task(TaskSpecBuilder::new("A").capability("nlp_to_sql"))
                .build(),
        ))
        .await
        .unwrap();
    rt_tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();

    with_timeout(Runtime::new(scheduler.clone(), rt_rx, options()).run())
        .await
        .unwrap();

    assert!(!scheduler.all_finished().await);
    assert_eq!(scheduler.in_progress_count("p1").await.unwrap(), 1);
}
