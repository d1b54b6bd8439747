use chrono::{DateTime, Utc};

use sentinel_protocol::WireRecord;
use sentinel_scan::AnomalyCount;

/// Result of one tick, ready for delivery.
///
/// Fields are private; a record never changes after the encoder builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    timestamp: DateTime<Utc>,
    source_id: String,
    scan_target: String,
    anomaly_count: AnomalyCount,
}

impl TelemetryRecord {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        source_id: String,
        scan_target: String,
        anomaly_count: AnomalyCount,
    ) -> Self {
        Self {
            timestamp,
            source_id,
            scan_target,
            anomaly_count,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn scan_target(&self) -> &str {
        &self.scan_target
    }

    pub fn anomaly_count(&self) -> AnomalyCount {
        self.anomaly_count
    }

    /// Converts to the collector wire format (second precision).
    pub fn to_wire(&self) -> WireRecord {
        WireRecord::scan(
            self.timestamp.timestamp(),
            self.source_id.clone(),
            self.anomaly_count,
        )
    }

    /// Serializes to collector wire JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.to_wire().to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> TelemetryRecord {
        let ts = Utc.timestamp_opt(1_700_000_123, 987_000_000).unwrap();
        TelemetryRecord::new(ts, "sentinel-01".into(), "/proc/mem".into(), 5)
    }

    #[test]
    fn wire_roundtrip_preserves_fields() {
        let record = sample();
        let json = record.to_json().unwrap();
        let parsed = WireRecord::from_json(&json).unwrap();

        assert_eq!(parsed.payload.anomalies, record.anomaly_count());
        assert_eq!(parsed.source, record.source_id());
        assert_eq!(parsed.timestamp, record.timestamp().timestamp());
    }

    #[test]
    fn wire_timestamp_truncates_to_seconds() {
        assert_eq!(sample().to_wire().timestamp, 1_700_000_123);
    }

    #[test]
    fn scan_target_stays_local() {
        let json = sample().to_json().unwrap();
        assert!(!json.contains("/proc/mem"));
    }
}
