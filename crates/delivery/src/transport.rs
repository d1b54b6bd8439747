//! Transport trait for collector sessions.

use std::future::Future;
use std::pin::Pin;

use sentinel_protocol::{CollectorAck, WireRecord};

use crate::error::{ConnectError, TransportError};

/// A boxed future returned by transport methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One persistent session to the collector.
///
/// The delivery client is the only caller and never issues two calls at
/// once. Any future may be dropped mid-flight (timeouts, cancellation); the
/// client then closes the session before using it again.
pub trait Transport: Send {
    /// Collector address, for log context.
    fn endpoint(&self) -> &str;

    /// Opens a session, replacing any previous one.
    fn connect(&mut self) -> TransportFuture<'_, Result<(), ConnectError>>;

    /// Sends one record and waits for the collector's reply.
    fn send<'a>(
        &'a mut self,
        record: &'a WireRecord,
    ) -> TransportFuture<'a, Result<CollectorAck, TransportError>>;

    /// Closes the session if one is open.
    fn close(&mut self) -> TransportFuture<'_, ()>;
}
