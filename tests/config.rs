// tests/config.rs

use std::io::Write;
use std::time::Duration;

use agentflow::config::{
    ConfigFile, default_config_path, load_and_validate, load_from_str, parse_duration,
};
use agentflow::errors::SchedulerError;
use agentflow::types::{Address, Capability};
use agentflow_test_utils::builders::ConfigFileBuilder;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_a_complete_config_file() {
    let file = write_config(
        r#"
[scheduler]
max_parallel_tasks = 2
default_retry_count = 1
default_timeout = "90s"
sweep_interval = "250ms"

[transport]
submission_queue = "incoming"
failure_topic = "alerts"

[routes]
nlp_to_sql = "QueryAgentQueue"
report_generation = " ReportAgentQueue "
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.scheduler.max_parallel_tasks, 2);
    assert_eq!(cfg.scheduler.task_defaults.retry_count, 1);
    assert_eq!(cfg.scheduler.task_defaults.timeout, Duration::from_secs(90));
    assert_eq!(cfg.scheduler.sweep_interval, Duration::from_millis(250));
    assert_eq!(cfg.transport.submission_queue, "incoming");
    assert_eq!(cfg.transport.failure_topic, "alerts");
    assert_eq!(
        cfg.routes.get(&Capability::new("report_generation")),
        Some(&Address::new("ReportAgentQueue"))
    );
}

#[test]
fn empty_file_gets_defaults() {
    let cfg = ConfigFile::try_from(load_from_str("").unwrap()).unwrap();
    assert_eq!(cfg.scheduler.max_parallel_tasks, 4);
    assert_eq!(cfg.scheduler.task_defaults.retry_count, 3);
    assert_eq!(cfg.scheduler.task_defaults.timeout, Duration::from_secs(300));
    assert_eq!(cfg.transport.submission_queue, "task_scheduler");
    assert_eq!(cfg.transport.failure_topic, "orchestrator_failures");
    assert!(cfg.routes.is_empty());
    assert_eq!(default_config_path().to_str(), Some("Agentflow.toml"));
}

#[test]
fn zero_parallelism_is_rejected() {
    let raw = load_from_str("[scheduler]\nmax_parallel_tasks = 0\n").unwrap();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, SchedulerError::ConfigError(ref m) if m.contains("max_parallel_tasks")));
}

#[test]
fn bad_durations_are_rejected() {
    for bad in ["10", "5 days", "0s", ""] {
        let raw = load_from_str(&format!("[scheduler]\ndefault_timeout = \"{bad}\"\n")).unwrap();
        assert!(
            matches!(ConfigFile::try_from(raw), Err(SchedulerError::ConfigError(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn empty_route_address_is_rejected() {
    let raw = load_from_str("[routes]\nnlp_to_sql = \"  \"\n").unwrap();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(err.to_string().contains("nlp_to_sql"));
}

#[test]
fn empty_failure_topic_is_rejected() {
    let raw = load_from_str("[transport]\nfailure_topic = \"\"\n").unwrap();
    assert!(ConfigFile::try_from(raw).is_err());
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let err = load_from_str("[scheduler\nmax_parallel_tasks = 1").unwrap_err();
    assert!(matches!(err, SchedulerError::TomlError(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Agentflow.toml").unwrap_err();
    assert!(matches!(err, SchedulerError::IoError(_)));
}

#[test]
fn duration_units() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
    assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(parse_duration("1H").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("1d").is_err());
}

#[test]
fn builder_produces_validated_config() {
    let cfg = ConfigFileBuilder::new()
        .with_route("nlp_to_sql", "QueryAgentQueue")
        .max_parallel_tasks(8)
        .default_retry_count(0)
        .default_timeout("2m")
        .build();

    assert_eq!(cfg.scheduler.max_parallel_tasks, 8);
    assert_eq!(cfg.scheduler.task_defaults.retry_count, 0);
    assert_eq!(cfg.scheduler.task_defaults.timeout, Duration::from_secs(120));
    assert_eq!(cfg.routes.len(), 1);
}
