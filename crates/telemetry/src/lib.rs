//! Telemetry encoding for the sentinel agent.
//!
//! Turns scan results into immutable [`TelemetryRecord`]s stamped by a
//! [`MonotonicClock`], and converts them to the collector wire format.

mod clock;
mod encoder;
mod record;

pub use clock::MonotonicClock;
pub use encoder::TelemetryEncoder;
pub use record::TelemetryRecord;
