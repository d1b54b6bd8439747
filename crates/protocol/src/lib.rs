pub mod constants;
pub mod telemetry;

// Re-export primary types for convenience.
pub use constants::RecordKind;
pub use telemetry::{CollectorAck, ScanPayload, WireRecord};
