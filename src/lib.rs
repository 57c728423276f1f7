// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod routing;
pub mod transport;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::dag::ProcessState;
use crate::engine::{Runtime, RuntimeEvent, RuntimeOptions, Scheduler, Submission};
use crate::routing::AgentRouter;
use crate::transport::wire::parse_submission_str;
use crate::transport::{StdioTransport, spawn_outbound_pump, spawn_stdin_reader};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - router / scheduler / runtime
/// - the stdio transport and its outbound pump
/// - submissions seeded from `--submit` files
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let submissions = load_submissions(&args.submit)?;

    if args.dry_run {
        return print_dry_run(&cfg, &submissions);
    }

    let router = Arc::new(AgentRouter::from_config(&cfg));
    let transport = Arc::new(StdioTransport::stdout(cfg.transport.failure_topic.clone()));
    let (outbound_tx, pump) = spawn_outbound_pump(transport);
    let scheduler = Scheduler::new(cfg.scheduler, router, outbound_tx);

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    info!(
        queue = %cfg.transport.submission_queue,
        "reading submissions and reports from stdin"
    );
    let _reader = spawn_stdin_reader(rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    for submission in submissions {
        let process_id = submission.process_id.clone();
        scheduler
            .submit(submission)
            .await
            .with_context(|| format!("submitting process '{process_id}'"))?;
    }

    let options = RuntimeOptions {
        sweep_interval: cfg.scheduler.sweep_interval,
        exit_when_idle: args.once,
    };

    Runtime::new(scheduler, rt_rx, options).run().await?;

    // The runtime owned the last scheduler handle; once it is gone the pump
    // drains what is left and stops.
    pump.await.context("outbound pump panicked")?;
    Ok(())
}

fn load_submissions(paths: &[PathBuf]) -> Result<Vec<Submission>> {
    paths.iter().map(|p| load_submission(p)).collect()
}

fn load_submission(path: &Path) -> Result<Submission> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading submission {}", path.display()))?;
    let submission = parse_submission_str(&contents)
        .with_context(|| format!("parsing submission {}", path.display()))?;
    Ok(submission)
}

/// Dry-run output: print settings, routes and submitted task graphs.
///
/// Each submission is registered into a throwaway process so cycles and
/// unknown dependencies are reported here too.
fn print_dry_run(cfg: &ConfigFile, submissions: &[Submission]) -> Result<()> {
    println!("agentflow dry-run");
    println!(
        "  scheduler.max_parallel_tasks = {}",
        cfg.scheduler.max_parallel_tasks
    );
    println!(
        "  scheduler.default_retry_count = {}",
        cfg.scheduler.task_defaults.retry_count
    );
    println!(
        "  scheduler.default_timeout = {:?}",
        cfg.scheduler.task_defaults.timeout
    );
    println!(
        "  scheduler.sweep_interval = {:?}",
        cfg.scheduler.sweep_interval
    );
    println!(
        "  transport.submission_queue = {}",
        cfg.transport.submission_queue
    );
    println!("  transport.failure_topic = {}", cfg.transport.failure_topic);
    println!();

    println!("routes ({}):", cfg.routes.len());
    for (capability, address) in cfg.routes.iter() {
        println!("  - {capability} -> {address}");
    }

    if submissions.is_empty() {
        debug!("dry-run complete (no submissions)");
        return Ok(());
    }

    println!();
    println!("submissions ({}):", submissions.len());
    for submission in submissions {
        let mut state = ProcessState::new(
            submission.process_id.clone(),
            submission
                .max_parallel_tasks
                .unwrap_or(cfg.scheduler.max_parallel_tasks),
        );
        state
            .register(submission.tasks.clone(), &cfg.scheduler.task_defaults)
            .with_context(|| format!("validating process '{}'", submission.process_id))?;

        println!(
            "  - process {} (max_parallel_tasks = {})",
            submission.process_id,
            state.max_parallel_tasks()
        );
        for task in state.graph().tasks() {
            let caps: Vec<&str> = task.capabilities.iter().map(|c| c.as_str()).collect();
            println!("      {}: {}", task.task_id, task.name);
            println!("        capabilities: {caps:?}");
            if !task.dependencies.is_empty() {
                println!("        after: {:?}", task.dependencies);
            }
            println!(
                "        retry_count: {}, timeout: {:?}",
                task.retry_count, task.timeout
            );
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
