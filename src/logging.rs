// src/logging.rs

//! Logging setup for `agentflow` using `tracing` + `tracing-subscriber`.
//!
//! Filter, in priority order:
//! 1. `--log-level` CLI flag, applied to `agentflow` modules
//! 2. `AGENTFLOW_LOG`: a bare level ("debug") or full filter directives
//!    ("info,agentflow::engine=trace")
//! 3. `info` for `agentflow` modules
//!
//! Dependencies stay at `warn` unless `AGENTFLOW_LOG` names them.
//!
//! Logs go to STDERR, as text or one JSON object per line; stdout is
//! reserved for the JSON-lines transport.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{LogFormat, LogLevel};

pub const LOG_ENV: &str = "AGENTFLOW_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, format: LogFormat) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let directives = filter_directives(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}'"))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        // Span lists are noise for a single-threaded event loop.
        LogFormat::Json => builder.json().with_span_list(false).init(),
    }

    Ok(())
}

/// Filter directives for the given CLI level and `AGENTFLOW_LOG` value.
///
/// An unparsable `AGENTFLOW_LOG` falls back to the default.
pub fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return crate_directives(level_name(lvl));
    }

    let Some(raw) = env.map(str::trim).filter(|s| !s.is_empty()) else {
        return crate_directives("info");
    };

    if let Some(level) = parse_level_str(raw) {
        return crate_directives(level);
    }
    if EnvFilter::try_new(raw).is_ok() {
        return raw.to_string();
    }
    crate_directives("info")
}

fn crate_directives(level: &str) -> String {
    format!("warn,agentflow={level}")
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_level_str(s: &str) -> Option<&'static str> {
    match s.to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}
