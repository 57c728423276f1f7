#![allow(dead_code)]

use std::time::Duration;

use serde_json::{Map, Value};

use agentflow::config::{ConfigFile, RawConfigFile, SchedulerSettings};
use agentflow::dag::{TaskDefaults, TaskSpec};
use agentflow::engine::Submission;
use agentflow::types::Capability;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_route(mut self, capability: &str, address: &str) -> Self {
        self.config
            .routes
            .insert(capability.to_string(), address.to_string());
        self
    }

    pub fn max_parallel_tasks(mut self, n: usize) -> Self {
        self.config.scheduler.max_parallel_tasks = n;
        self
    }

    pub fn default_retry_count(mut self, n: u32) -> Self {
        self.config.scheduler.default_retry_count = n;
        self
    }

    pub fn default_timeout(mut self, s: &str) -> Self {
        self.config.scheduler.default_timeout = s.to_string();
        self
    }

    pub fn sweep_interval(mut self, s: &str) -> Self {
        self.config.scheduler.sweep_interval = s.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler settings with the given parallelism and default task knobs.
pub fn settings(max_parallel_tasks: usize, retry_count: u32, timeout: Duration) -> SchedulerSettings {
    SchedulerSettings {
        max_parallel_tasks,
        task_defaults: TaskDefaults {
            retry_count,
            timeout,
        },
        sweep_interval: Duration::from_secs(1),
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(task_id: &str) -> Self {
        Self {
            spec: TaskSpec::new(task_id, format!("task {task_id}")),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.spec.name = name.to_string();
        self
    }

    pub fn capability(mut self, capability: &str) -> Self {
        self.spec.capabilities.push(Capability::new(capability));
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.spec.dependencies.push(dep.to_string());
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.spec.retry_count = Some(n);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = Some(timeout);
        self
    }

    pub fn context(mut self, key: &str, value: Value) -> Self {
        self.spec.context.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

/// Builder for `Submission`.
pub struct SubmissionBuilder {
    submission: Submission,
}

impl SubmissionBuilder {
    pub fn new(process_id: &str) -> Self {
        Self {
            submission: Submission {
                process_id: process_id.to_string(),
                tasks: Vec::new(),
                max_parallel_tasks: None,
            },
        }
    }

    pub fn task(mut self, task: TaskSpecBuilder) -> Self {
        self.submission.tasks.push(task.build());
        self
    }

    pub fn max_parallel_tasks(mut self, n: usize) -> Self {
        self.submission.max_parallel_tasks = Some(n);
        self
    }

    pub fn build(self) -> Submission {
        self.submission
    }
}

/// JSON object for a task, in submission wire format.
pub fn task_json(task_id: &str, capability: &str, deps: &[&str]) -> Value {
    let mut obj = Map::new();
    obj.insert("task_id".into(), Value::from(task_id));
    obj.insert("task_name".into(), Value::from(format!("task {task_id}")));
    obj.insert("capabilities".into(), Value::from(capability));
    obj.insert(
        "dependencies".into(),
        Value::Array(deps.iter().map(|d| Value::from(*d)).collect()),
    );
    Value::Object(obj)
}
