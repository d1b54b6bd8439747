//! Wires the production components together and runs them.

use std::sync::Arc;

use sentinel_agent::{
    AgentState, InstanceGuard, LifecycleManager, ShutdownTrigger, spawn_signal_listener,
};
use sentinel_delivery::WsTransport;
use sentinel_scan::PathScanner;
use sentinel_telemetry::TelemetryEncoder;
use tokio::sync::watch;

use crate::config::Config;

/// Runs the agent until a shutdown signal arrives.
///
/// Startup failures are returned as errors so the process exits non-zero.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let _instance = InstanceGuard::acquire()?;

    let transport = WsTransport::new(
        config.collector_endpoint.clone(),
        config.collector_token.clone(),
    );
    let manager = LifecycleManager::new(
        PathScanner::new(),
        transport,
        config.delivery_config(),
        config.loop_config(),
        TelemetryEncoder::new(config.source_id.clone()),
    );

    let trigger = Arc::new(ShutdownTrigger::new(manager.cancel_token()));
    let listener = spawn_signal_listener(Arc::clone(&trigger))?;
    let progress = tokio::spawn(log_progress(manager.subscribe_state()));

    let result = manager.run().await;
    listener.abort();
    progress.abort();

    let summary = result?;
    tracing::info!(
        iterations = summary.iterations,
        flushed = summary.shutdown.flushed,
        abandoned = summary.shutdown.abandoned,
        signalled = trigger.has_fired(),
        "agent finished"
    );
    Ok(())
}

/// Logs each completed tick at debug level.
async fn log_progress(mut state: watch::Receiver<AgentState>) {
    while state.changed().await.is_ok() {
        let snapshot = state.borrow_and_update().clone();
        tracing::debug!(
            running = snapshot.running,
            iteration = snapshot.iteration,
            last_scan_result = ?snapshot.last_scan_result,
            "agent state"
        );
    }
}
