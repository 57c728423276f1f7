// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile, SchedulerSettings};
use crate::dag::TaskDefaults;
use crate::errors::{Result, SchedulerError};
use crate::types::{Address, Capability};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SchedulerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let scheduler = validate_scheduler_section(&raw)?;
        validate_transport_section(&raw)?;
        validate_routes(&raw)?;

        let routes = raw
            .routes
            .into_iter()
            .map(|(cap, addr)| (Capability::new(cap.trim()), Address::new(addr.trim())))
            .collect();

        Ok(ConfigFile {
            scheduler,
            transport: raw.transport,
            routes,
        })
    }
}

fn validate_scheduler_section(cfg: &RawConfigFile) -> Result<SchedulerSettings> {
    let section = &cfg.scheduler;

    if section.max_parallel_tasks == 0 {
        return Err(SchedulerError::ConfigError(
            "[scheduler].max_parallel_tasks must be >= 1 (got 0)".to_string(),
        ));
    }

    let timeout = parse_nonzero_duration("default_timeout", &section.default_timeout)?;
    let sweep_interval = parse_nonzero_duration("sweep_interval", &section.sweep_interval)?;

    Ok(SchedulerSettings {
        max_parallel_tasks: section.max_parallel_tasks,
        task_defaults: TaskDefaults {
            retry_count: section.default_retry_count,
            timeout,
        },
        sweep_interval,
    })
}

fn validate_transport_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.transport.submission_queue.trim().is_empty() {
        return Err(SchedulerError::ConfigError(
            "[transport].submission_queue must not be empty".to_string(),
        ));
    }
    if cfg.transport.failure_topic.trim().is_empty() {
        return Err(SchedulerError::ConfigError(
            "[transport].failure_topic must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_routes(cfg: &RawConfigFile) -> Result<()> {
    for (capability, address) in cfg.routes.iter() {
        if capability.trim().is_empty() {
            return Err(SchedulerError::ConfigError(
                "[routes] contains an empty capability tag".to_string(),
            ));
        }
        if address.trim().is_empty() {
            return Err(SchedulerError::ConfigError(format!(
                "route for capability '{}' has an empty address",
                capability
            )));
        }
    }
    Ok(())
}

fn parse_nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value).map_err(|e| {
        SchedulerError::ConfigError(format!("[scheduler].{field}: {e}"))
    })?;
    if dur.is_zero() {
        return Err(SchedulerError::ConfigError(format!(
            "[scheduler].{field} must be greater than zero"
        )));
    }
    Ok(dur)
}

/// Parse strings like `"250ms"`, `"3s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
