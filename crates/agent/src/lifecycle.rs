//! Component startup and teardown ordering.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sentinel_delivery::{
    ConnectError, DeliveryClient, DeliveryConfig, ShutdownReport, Transport,
};
use sentinel_protocol::constants::SCANNER_SHUTDOWN_TIMEOUT;
use sentinel_scan::{ScanError, ScanProvider};
use sentinel_telemetry::TelemetryEncoder;

use crate::agent_loop::{AgentLoop, LoopConfig};
use crate::state::AgentState;

const SCAN_COMPONENT: &str = "scan provider";
const DELIVERY_COMPONENT: &str = "delivery client";

/// Startup failure. The agent never runs in a degraded mode.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("{component} failed to initialize")]
    InitFailed {
        component: &'static str,
        #[source]
        cause: InitCause,
    },
}

/// Underlying error of [`FatalError::InitFailed`].
#[derive(Debug, thiserror::Error)]
pub enum InitCause {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

static AGENT_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Another agent already runs in this process.
#[derive(Debug, thiserror::Error)]
#[error("an agent is already running in this process")]
pub struct AlreadyRunning;

/// Process-wide claim on the single agent slot, released on drop.
///
/// The daemon holds one for the lifetime of its [`LifecycleManager`], so a
/// second agent loop cannot be started next to it.
#[derive(Debug)]
pub struct InstanceGuard {
    _private: (),
}

impl InstanceGuard {
    pub fn acquire() -> Result<Self, AlreadyRunning> {
        AGENT_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| AlreadyRunning)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        AGENT_CLAIMED.store(false, Ordering::Release);
    }
}

/// Outcome of a completed [`LifecycleManager::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub shutdown: ShutdownReport,
}

/// Owns the agent's components and runs them start to finish.
///
/// Startup order is scan provider, then collector connection. Shutdown
/// runs in reverse and every step is attempted even if an earlier one
/// failed. [`run`](Self::run) consumes the manager, so each component is
/// shut down exactly once.
pub struct LifecycleManager<S: ScanProvider, T: Transport> {
    scanner: S,
    delivery: DeliveryClient<T>,
    agent: AgentLoop,
    cancel: CancellationToken,
}

impl<S: ScanProvider, T: Transport> LifecycleManager<S, T> {
    pub fn new(
        scanner: S,
        transport: T,
        delivery_config: DeliveryConfig,
        loop_config: LoopConfig,
        encoder: TelemetryEncoder,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            scanner,
            delivery: DeliveryClient::new(transport, delivery_config, cancel.clone()),
            agent: AgentLoop::new(loop_config, encoder, cancel.clone()),
            cancel,
        }
    }

    /// Token that stops the agent when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver for loop state snapshots.
    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.agent.subscribe()
    }

    /// Starts the components, runs the loop until cancelled, then shuts
    /// everything down.
    pub async fn run(mut self) -> Result<RunSummary, FatalError> {
        info!(provider = self.scanner.name(), "starting components");

        if let Err(e) = self.scanner.start().await {
            error!(
                component = SCAN_COMPONENT,
                op = "start",
                error = %e,
                "startup failed"
            );
            return Err(FatalError::InitFailed {
                component: SCAN_COMPONENT,
                cause: e.into(),
            });
        }
        info!(component = SCAN_COMPONENT, "started");

        let iterations = match self.delivery.connect().await {
            Ok(()) => {
                info!(component = DELIVERY_COMPONENT, "started");
                self.agent.run(&self.scanner, &mut self.delivery).await.iterations
            }
            Err(ConnectError::Cancelled) => {
                info!("shutdown requested during startup, skipping loop");
                0
            }
            Err(e) => {
                error!(
                    component = DELIVERY_COMPONENT,
                    op = "connect",
                    error = %e,
                    "startup failed"
                );
                self.shutdown().await;
                return Err(FatalError::InitFailed {
                    component: DELIVERY_COMPONENT,
                    cause: e.into(),
                });
            }
        };

        let shutdown = self.shutdown().await;
        info!(iterations, "agent stopped");
        Ok(RunSummary {
            iterations,
            shutdown,
        })
    }

    async fn shutdown(&mut self) -> ShutdownReport {
        info!("shutting down components");

        let report = self.delivery.shutdown().await;
        info!(
            component = DELIVERY_COMPONENT,
            flushed = report.flushed,
            abandoned = report.abandoned,
            "stopped"
        );

        match tokio::time::timeout(SCANNER_SHUTDOWN_TIMEOUT, self.scanner.shutdown()).await {
            Ok(Ok(())) => info!(component = SCAN_COMPONENT, "stopped"),
            Ok(Err(e)) => warn!(
                component = SCAN_COMPONENT,
                op = "shutdown",
                error = %e,
                "shutdown failed"
            ),
            Err(_) => warn!(
                component = SCAN_COMPONENT,
                op = "shutdown",
                error = "timed out",
                timeout_ms = SCANNER_SHUTDOWN_TIMEOUT.as_millis() as u64,
                "shutdown abandoned"
            ),
        }

        report
    }
}
