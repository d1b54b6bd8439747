//! Telemetry delivery to the remote collector.
//!
//! [`DeliveryClient`] owns the bounded [`DeliveryQueue`], the connection
//! state machine and the retry schedule. The wire session itself sits
//! behind the [`Transport`] trait: [`WsTransport`] talks WebSocket to a real
//! collector, [`fake::FakeTransport`] stands in for it in tests.

mod client;
pub mod error;
pub mod fake;
pub mod queue;
pub mod transport;
pub mod types;
pub mod ws_transport;

pub use client::DeliveryClient;
pub use error::{ConnectError, DeliveryError, TransportError};
pub use queue::{DeliveryQueue, PendingRecord};
pub use transport::{Transport, TransportFuture};
pub use types::{BackoffConfig, ConnectionState, DeliveryConfig, EnqueueOutcome, ShutdownReport};
pub use ws_transport::WsTransport;
