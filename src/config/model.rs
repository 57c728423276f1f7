// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::TaskDefaults;
use crate::types::{Address, Capability};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// max_parallel_tasks = 4
/// default_retry_count = 3
/// default_timeout = "300s"
/// sweep_interval = "1s"
///
/// [transport]
/// submission_queue = "task_scheduler"
/// failure_topic = "orchestrator_failures"
///
/// [routes]
/// nlp_to_sql = "QueryAgentQueue"
/// database_operations = "SQLAgentQueue"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub transport: TransportSection,

    /// Capability tag -> agent queue name.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Upper bound on concurrently `IN_PROGRESS` tasks per process, used
    /// when a submission does not carry its own.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    #[serde(default = "default_retry_count")]
    pub default_retry_count: u32,

    /// Duration string such as `"300s"` or `"5m"`.
    #[serde(default = "default_timeout")]
    pub default_timeout: String,

    /// How often the runtime sweeps for timed-out tasks.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

fn default_max_parallel_tasks() -> usize {
    4
}

fn default_retry_count() -> u32 {
    crate::dag::task::DEFAULT_RETRY_COUNT
}

fn default_timeout() -> String {
    "300s".to_string()
}

fn default_sweep_interval() -> String {
    "1s".to_string()
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            default_retry_count: default_retry_count(),
            default_timeout: default_timeout(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// `[transport]` section: well-known queue and topic names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportSection {
    /// Queue submissions are consumed from.
    #[serde(default = "default_submission_queue")]
    pub submission_queue: String,

    /// Topic escalations are published to.
    #[serde(default = "default_failure_topic")]
    pub failure_topic: String,
}

fn default_submission_queue() -> String {
    "task_scheduler".to_string()
}

fn default_failure_topic() -> String {
    "orchestrator_failures".to_string()
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            submission_queue: default_submission_queue(),
            failure_topic: default_failure_topic(),
        }
    }
}

/// Scheduler knobs with durations already parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub max_parallel_tasks: usize,
    pub task_defaults: TaskDefaults,
    pub sweep_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            task_defaults: TaskDefaults::default(),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Validated configuration. Only constructed through
/// `TryFrom<RawConfigFile>` (or `Default`).
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub scheduler: SchedulerSettings,
    pub transport: TransportSection,
    pub routes: BTreeMap<Capability, Address>,
}
