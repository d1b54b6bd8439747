//! Scan provider capability for the sentinel agent.
//!
//! A [`ScanProvider`] performs one low-level scan against a target path and
//! reports an anomaly count. The orchestrator only ever talks to the trait;
//! [`PathScanner`] is the production implementation and [`fake`] holds a
//! scripted provider for tests.

pub mod fake;
mod path_scanner;
mod provider;

#[cfg(unix)]
#[path = "mode_unix.rs"]
mod platform;

#[cfg(not(unix))]
#[path = "mode_other.rs"]
mod platform;

pub use path_scanner::PathScanner;
pub use provider::{AnomalyCount, ScanError, ScanFuture, ScanProvider, bounded_scan};
