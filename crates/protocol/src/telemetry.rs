use serde::{Deserialize, Serialize};

use crate::constants::RecordKind;

/// Telemetry record as sent to the collector.
///
/// The shape is fixed for collector compatibility:
/// `{"timestamp": 1700000000, "source": "...", "type": "low_level_scan",
/// "payload": {"anomalies": 3}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub payload: ScanPayload,
}

/// Result of a single low-level scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPayload {
    pub anomalies: u64,
}

impl WireRecord {
    /// Creates a scan record.
    pub fn scan(timestamp: i64, source: impl Into<String>, anomalies: u64) -> Self {
        Self {
            timestamp,
            source: source.into(),
            kind: RecordKind::LowLevelScan,
            payload: ScanPayload { anomalies },
        }
    }

    /// Serializes the record into its wire JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a record from wire JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Collector reply to a single [`WireRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alert_id: String,
}

impl CollectorAck {
    /// Positive acknowledgement.
    pub fn accepted(alert_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: String::new(),
            alert_id: alert_id.into(),
        }
    }

    /// Negative acknowledgement with a reason.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            alert_id: String::new(),
        }
    }
}
