use chrono::{DateTime, Utc};

use sentinel_scan::AnomalyCount;

use crate::record::TelemetryRecord;

/// Builds telemetry records for one agent.
#[derive(Debug, Clone)]
pub struct TelemetryEncoder {
    source_id: String,
}

impl TelemetryEncoder {
    /// Creates an encoder stamping records with `source_id`.
    ///
    /// The id is validated by configuration loading.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Builds a record. `now` is the encode-time reading of a
    /// [`MonotonicClock`](crate::MonotonicClock), not the scan start.
    pub fn encode(
        &self,
        target: &str,
        anomaly_count: AnomalyCount,
        now: DateTime<Utc>,
    ) -> TelemetryRecord {
        TelemetryRecord::new(
            now,
            self.source_id.clone(),
            target.to_string(),
            anomaly_count,
        )
    }
}
