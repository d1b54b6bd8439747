//! Error types for telemetry delivery.

use tokio_tungstenite::tungstenite;

/// Failure to establish a collector session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("collector unreachable: {0}")]
    Unreachable(String),

    #[error("collector rejected credentials: {0}")]
    AuthFailed(String),

    #[error("cancelled")]
    Cancelled,
}

/// Failure of a flush pass. Unsent records stay queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport closed")]
    TransportClosed,

    #[error("transport failed after {sent} records, {remaining} still queued")]
    PartialSend { sent: usize, remaining: usize },

    #[error("cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Records acknowledged before the failure.
    pub fn sent(&self) -> usize {
        match self {
            DeliveryError::PartialSend { sent, .. } => *sent,
            _ => 0,
        }
    }
}

/// Failure of a single transport send.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("send timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}
