//! The periodic scan → encode → enqueue → flush loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use sentinel_delivery::{DeliveryClient, DeliveryError, EnqueueOutcome, Transport};
use sentinel_protocol::constants::{DEFAULT_SCAN_TARGET, DEFAULT_SCAN_TIMEOUT, DEFAULT_TICK_INTERVAL};
use sentinel_scan::{ScanProvider, bounded_scan};
use sentinel_telemetry::{MonotonicClock, TelemetryEncoder};

use crate::state::AgentState;

/// Floor for the tick interval; `tokio::time::interval` rejects zero.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub scan_target: String,
    /// Start-to-start period between ticks.
    pub tick_interval: Duration,
    pub scan_timeout: Duration,
    /// Stop after this many ticks (`None` = until cancelled).
    pub max_ticks: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            scan_target: DEFAULT_SCAN_TARGET.into(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            max_ticks: None,
        }
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Ticks that reached the encode step.
    pub iterations: u64,
}

enum Tick {
    Completed,
    Abandoned,
}

/// Drives one tick at a time until cancelled.
///
/// Ticks never overlap: a slow scan or flush delays the next tick instead
/// of stacking up behind it.
pub struct AgentLoop {
    config: LoopConfig,
    encoder: TelemetryEncoder,
    clock: MonotonicClock,
    state: watch::Sender<AgentState>,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(config: LoopConfig, encoder: TelemetryEncoder, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(AgentState::default());
        Self {
            config,
            encoder,
            clock: MonotonicClock::new(),
            state,
            cancel,
        }
    }

    /// Returns a receiver for state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Current state snapshot.
    pub fn state(&self) -> AgentState {
        self.state.borrow().clone()
    }

    /// Runs ticks until the cancellation token fires or `max_ticks` is
    /// reached. The first tick starts immediately.
    pub async fn run<S, T>(&mut self, scanner: &S, delivery: &mut DeliveryClient<T>) -> LoopSummary
    where
        S: ScanProvider + ?Sized,
        T: Transport,
    {
        let period = self.config.tick_interval.max(MIN_TICK_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.state.send_modify(|s| s.running = true);
        info!(
            provider = scanner.name(),
            scan_target = %self.config.scan_target,
            interval_ms = period.as_millis() as u64,
            "agent loop started"
        );

        let mut iterations = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.config.max_ticks.is_some_and(|max| iterations >= max) {
                debug!(iterations, "tick limit reached");
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(scanner, delivery).await {
                Tick::Completed => iterations += 1,
                Tick::Abandoned => break,
            }
        }

        self.state.send_modify(|s| s.running = false);
        info!(iterations, "agent loop stopped");
        LoopSummary { iterations }
    }

    async fn tick<S, T>(&mut self, scanner: &S, delivery: &mut DeliveryClient<T>) -> Tick
    where
        S: ScanProvider + ?Sized,
        T: Transport,
    {
        let iteration = self.state.borrow().iteration + 1;
        let target = self.config.scan_target.as_str();

        let scanned = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(iteration, "tick abandoned during scan");
                return Tick::Abandoned;
            }
            r = bounded_scan(scanner, target, self.config.scan_timeout) => r,
        };

        let (count, last) = match scanned {
            Ok(n) => (n, Some(n)),
            Err(e) => {
                warn!(
                    component = "scan",
                    op = "scan",
                    provider = scanner.name(),
                    scan_target = target,
                    iteration,
                    error = %e,
                    "scan failed, reporting zero anomalies"
                );
                (0, None)
            }
        };

        let record = self.encoder.encode(target, count, self.clock.now());
        self.state.send_modify(|s| {
            s.iteration = iteration;
            s.last_scan_result = last;
        });
        trace!(iteration, anomalies = count, "record encoded");

        if let EnqueueOutcome::Dropped { .. } = delivery.enqueue(record) {
            debug!(iteration, "oldest queued record evicted");
        }

        match delivery.flush().await {
            Ok(sent) => trace!(iteration, sent, "flush finished"),
            Err(DeliveryError::Cancelled) => debug!(iteration, "flush interrupted by shutdown"),
            Err(e) => debug!(
                component = "delivery",
                op = "flush",
                iteration,
                queued = delivery.queue().len(),
                error = %e,
                "records held for retry"
            ),
        }

        Tick::Completed
    }
}
