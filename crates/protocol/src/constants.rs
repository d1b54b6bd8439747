use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default filesystem target handed to the scan provider.
pub const DEFAULT_SCAN_TARGET: &str = "/proc/mem";

/// Default time between the start of one tick and the start of the next.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound of the pending-delivery queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Upper bound for a single scan before it is reported as timed out.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for establishing a collector session.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for one record to be written and acknowledged.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a whole flush pass during normal operation.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the last flush attempted while shutting down.
pub const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for the scan provider's release hook.
pub const SCANNER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Time the daemon waits for stray blocking work once the agent has stopped.
pub const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// First backoff delay after a failed connection.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Backoff cap.
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Multiplier applied per failed attempt.
pub const BACKOFF_FACTOR: f64 = 2.0;

/// Symmetric jitter applied to each backoff delay (±20%).
pub const BACKOFF_JITTER: f64 = 0.2;

/// Largest collector reply accepted (64 KB). Acks are tiny.
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Telemetry record type identifier (the `type` field on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "low_level_scan")]
    LowLevelScan,
}

impl RecordKind {
    /// Wire name of the record kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::LowLevelScan => "low_level_scan",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_serialization() {
        let json = serde_json::to_string(&RecordKind::LowLevelScan).unwrap();
        assert_eq!(json, r#""low_level_scan""#);
        assert_eq!(RecordKind::LowLevelScan.as_str(), "low_level_scan");
    }

    #[test]
    fn unknown_record_kind() {
        let result: Result<RecordKind, _> = serde_json::from_str(r#""process_alert""#);
        assert!(result.is_err());
    }

    #[test]
    fn backoff_constants_are_ordered() {
        assert!(BACKOFF_BASE < BACKOFF_MAX);
        assert!(BACKOFF_JITTER > 0.0 && BACKOFF_JITTER < 1.0);
        assert!(SHUTDOWN_FLUSH_TIMEOUT < FLUSH_TIMEOUT);
    }
}
