pub mod builders;
pub mod recording_transport;

use std::sync::Arc;
use std::sync::Once;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use agentflow::config::SchedulerSettings;
use agentflow::dag::Dispatch;
use agentflow::engine::Scheduler;
use agentflow::routing::AgentRouter;
use agentflow::transport::{FailureEscalation, Outbound};
use agentflow::types::{Address, Capability};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Router with the given `(capability, address)` routes.
pub fn router_with(routes: &[(&str, &str)]) -> AgentRouter {
    let router = AgentRouter::new();
    for (capability, address) in routes {
        router.register(Capability::new(*capability), Address::new(*address));
    }
    router
}

/// Scheduler whose outbound queue is handed straight back to the test
/// instead of going through a transport.
pub fn scheduler_with(
    settings: SchedulerSettings,
    routes: &[(&str, &str)],
) -> (Scheduler, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(settings, Arc::new(router_with(routes)), tx);
    (scheduler, rx)
}

/// Everything currently sitting in the outbound queue, split by kind.
pub fn drain_outbound(
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
) -> (Vec<Dispatch>, Vec<FailureEscalation>) {
    let mut dispatches = Vec::new();
    let mut escalations = Vec::new();
    while let Ok(message) = rx.try_recv() {
        match message {
            Outbound::Dispatch(d) => dispatches.push(d),
            Outbound::Escalation(e) => escalations.push(e),
        }
    }
    (dispatches, escalations)
}
