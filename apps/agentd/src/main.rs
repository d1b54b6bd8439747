//! Sentinel agent daemon entry point.

mod app;
mod config;

use std::future::Future;

use sentinel_protocol::constants::RUNTIME_SHUTDOWN_TIMEOUT;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting sentinel agent"
    );

    let config = config::Config::load()?;
    tracing::info!(
        source_id = %config.source_id,
        endpoint = %config.collector_endpoint,
        scan_target = %config.scan_target,
        "configuration loaded"
    );

    let rt = Runtime::new()?;
    block_on_bounded(rt, app::run(config))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}

/// Runs `fut` to completion, then tears the runtime down without waiting
/// more than [`RUNTIME_SHUTDOWN_TIMEOUT`] for blocking tasks still running
/// (a timed-out scan stuck in the kernel, for instance).
fn block_on_bounded<F: Future>(rt: Runtime, fut: F) -> F::Output {
    let output = rt.block_on(fut);
    rt.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    output
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn stuck_blocking_work_does_not_hold_exit() {
        let rt = Runtime::new().unwrap();
        let started = Instant::now();

        let value = block_on_bounded(rt, async {
            let _ = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            7
        });

        assert_eq!(value, 7);
        assert!(
            started.elapsed() < RUNTIME_SHUTDOWN_TIMEOUT + Duration::from_secs(2),
            "teardown took {:?}",
            started.elapsed()
        );
    }
}
