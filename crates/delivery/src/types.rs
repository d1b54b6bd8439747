//! Public types for the delivery client.

use std::time::Duration;

use sentinel_protocol::constants::{
    BACKOFF_BASE, BACKOFF_FACTOR, BACKOFF_JITTER, BACKOFF_MAX, CONNECT_TIMEOUT,
    DEFAULT_QUEUE_CAPACITY, FLUSH_TIMEOUT, SEND_TIMEOUT, SHUTDOWN_FLUSH_TIMEOUT,
};
use sentinel_telemetry::TelemetryRecord;

/// Connection state of the collector session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no retry scheduled.
    Disconnected,
    /// Session handshake in progress.
    Connecting,
    /// Session open; records can be sent.
    Connected,
    /// Session failed; waiting before reconnect attempt `attempt + 1`.
    Backoff { attempt: u32 },
}

/// Result of [`DeliveryClient::enqueue`](crate::DeliveryClient::enqueue).
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Queued with room to spare.
    Accepted,
    /// Queued, but the oldest record had to go.
    Dropped { evicted: TelemetryRecord },
}

/// What the final flush managed before the session was released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub flushed: usize,
    pub abandoned: usize,
}

/// Exponential backoff with jitter for reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub factor: f64,
    /// Relative jitter applied in both directions.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: BACKOFF_BASE,
            max_delay: BACKOFF_MAX,
            factor: BACKOFF_FACTOR,
            jitter: BACKOFF_JITTER,
        }
    }
}

impl BackoffConfig {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000.0)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        let with_jitter = (capped + capped * self.jitter * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}

/// Tunables for [`DeliveryClient`](crate::DeliveryClient).
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub queue_capacity: usize,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub flush_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout: CONNECT_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            flush_timeout: FLUSH_TIMEOUT,
            shutdown_timeout: SHUTDOWN_FLUSH_TIMEOUT,
            backoff: BackoffConfig::default(),
        }
    }
}
