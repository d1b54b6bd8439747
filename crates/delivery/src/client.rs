//! Delivery client: bounded queue, connection state machine and retries.
//!
//! The client never sleeps on its own. A failed connect or send moves the
//! session to [`ConnectionState::Backoff`] and records when the next attempt
//! is allowed; the next [`flush`](DeliveryClient::flush) after that instant
//! reconnects. Retries therefore ride on the caller's tick schedule.

use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use sentinel_protocol::CollectorAck;
use sentinel_telemetry::TelemetryRecord;

use crate::error::{ConnectError, DeliveryError, TransportError};
use crate::queue::DeliveryQueue;
use crate::transport::Transport;
use crate::types::{ConnectionState, DeliveryConfig, EnqueueOutcome, ShutdownReport};

/// Upper bound for closing a session.
const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

enum SendOutcome {
    Acked(CollectorAck),
    Failed(TransportError),
    Cancelled,
}

/// Owns the delivery queue and the collector session.
///
/// All methods take `&mut self`: enqueue and flush can never run
/// concurrently, and nothing else touches the queue.
pub struct DeliveryClient<T: Transport> {
    transport: T,
    queue: DeliveryQueue,
    state: ConnectionState,
    retry_at: Option<Instant>,
    session: Option<Uuid>,
    config: DeliveryConfig,
    cancel: CancellationToken,
    shut_down: bool,
}

impl<T: Transport> DeliveryClient<T> {
    /// Creates a disconnected client.
    ///
    /// `cancel` interrupts connects and flushes; [`shutdown`](Self::shutdown)
    /// deliberately ignores it.
    ///
    /// # Panics
    ///
    /// Panics if `config.queue_capacity` is zero.
    pub fn new(transport: T, config: DeliveryConfig, cancel: CancellationToken) -> Self {
        Self {
            transport,
            queue: DeliveryQueue::new(config.queue_capacity),
            state: ConnectionState::Disconnected,
            retry_at: None,
            session: None,
            config,
            cancel,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Records waiting for acknowledgement.
    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Time left before a reconnect is allowed, if in backoff.
    pub fn retry_in(&self) -> Option<Duration> {
        self.retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Opens the collector session.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let cancel = self.cancel.clone();
        let deadline = Instant::now() + self.config.connect_timeout;
        self.open_session(&cancel, deadline).await
    }

    /// Queues a record, evicting the oldest one when full.
    pub fn enqueue(&mut self, record: TelemetryRecord) -> EnqueueOutcome {
        match self.queue.push(record) {
            None => {
                trace!(queued = self.queue.len(), "record queued");
                EnqueueOutcome::Accepted
            }
            Some(evicted) => {
                warn!(
                    component = "delivery",
                    op = "enqueue",
                    capacity = self.queue.capacity(),
                    evicted_at = %evicted.timestamp(),
                    evicted_anomalies = evicted.anomaly_count(),
                    "queue full, evicted oldest record"
                );
                EnqueueOutcome::Dropped { evicted }
            }
        }
    }

    /// Sends queued records oldest first and returns how many were acked.
    ///
    /// Acked records leave the queue immediately, so a repeated flush never
    /// resends them. On a transport failure the unacked record and all
    /// later ones stay queued.
    pub async fn flush(&mut self) -> Result<usize, DeliveryError> {
        let cancel = self.cancel.clone();
        let deadline = Instant::now() + self.config.flush_timeout;
        self.flush_until(&cancel, deadline, false).await
    }

    /// Makes one last bounded flush, then releases the session.
    ///
    /// Ignores the backoff timer and the cancellation token. Records still
    /// queued afterwards are dropped. Calling it again is a no-op.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            debug!("delivery client already shut down");
            return ShutdownReport::default();
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        let uncancellable = CancellationToken::new();
        let flushed = match self.flush_until(&uncancellable, deadline, true).await {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    component = "delivery",
                    op = "shutdown",
                    error = %e,
                    "final flush incomplete"
                );
                e.sent()
            }
        };

        self.release_session().await;
        self.retry_at = None;
        self.set_state(ConnectionState::Disconnected);
        self.shut_down = true;

        let abandoned = self.queue.clear();
        if abandoned > 0 {
            warn!(
                component = "delivery",
                op = "shutdown",
                abandoned,
                "undelivered records dropped"
            );
        }
        info!(flushed, abandoned, "delivery client shut down");

        ShutdownReport { flushed, abandoned }
    }

    async fn flush_until(
        &mut self,
        cancel: &CancellationToken,
        deadline: Instant,
        ignore_backoff: bool,
    ) -> Result<usize, DeliveryError> {
        if self.queue.is_empty() {
            return Ok(0);
        }
        if self.shut_down {
            return Err(DeliveryError::TransportClosed);
        }

        if self.state != ConnectionState::Connected {
            if !ignore_backoff {
                if let Some(wait) = self.retry_in().filter(|d| !d.is_zero()) {
                    debug!(
                        retry_in_ms = wait.as_millis() as u64,
                        queued = self.queue.len(),
                        "in backoff, holding records"
                    );
                    return Err(DeliveryError::TransportClosed);
                }
            }
            match self.open_session(cancel, deadline).await {
                Ok(()) => {}
                Err(ConnectError::Cancelled) => return Err(DeliveryError::Cancelled),
                Err(_) => return Err(DeliveryError::TransportClosed),
            }
        }

        let send_timeout = self.config.send_timeout;
        let mut sent = 0;

        loop {
            let (wire, attempts) = match self.queue.front_mut() {
                Some(pending) => {
                    pending.attempts += 1;
                    (pending.record().to_wire(), pending.attempts)
                }
                None => break,
            };

            let send_deadline = deadline.min(Instant::now() + send_timeout);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => SendOutcome::Cancelled,
                r = timeout_at(send_deadline, self.transport.send(&wire)) => match r {
                    Ok(Ok(ack)) => SendOutcome::Acked(ack),
                    Ok(Err(e)) => SendOutcome::Failed(e),
                    Err(_) => SendOutcome::Failed(TransportError::Timeout),
                },
            };

            match outcome {
                SendOutcome::Acked(ack) if ack.success => {
                    self.queue.pop_front();
                    sent += 1;
                    trace!(
                        timestamp = wire.timestamp,
                        anomalies = wire.payload.anomalies,
                        retry = attempts > 1,
                        alert_id = %ack.alert_id,
                        "record acknowledged"
                    );
                }
                SendOutcome::Acked(ack) => {
                    self.queue.pop_front();
                    warn!(
                        component = "delivery",
                        op = "flush",
                        timestamp = wire.timestamp,
                        reason = %ack.message,
                        "collector rejected record, discarding"
                    );
                }
                SendOutcome::Cancelled => {
                    // A send was abandoned mid-flight; the session is unusable.
                    self.release_session().await;
                    self.retry_at = None;
                    self.set_state(ConnectionState::Disconnected);
                    debug!(sent, remaining = self.queue.len(), "flush cancelled");
                    return Err(DeliveryError::Cancelled);
                }
                SendOutcome::Failed(e) => {
                    self.release_session().await;
                    self.enter_backoff(1);
                    let remaining = self.queue.len();
                    warn!(
                        component = "delivery",
                        op = "flush",
                        endpoint = %self.transport.endpoint(),
                        sent,
                        remaining,
                        error = %e,
                        "transport failed, unsent records kept for retry"
                    );
                    return Err(if sent > 0 {
                        DeliveryError::PartialSend { sent, remaining }
                    } else {
                        DeliveryError::TransportClosed
                    });
                }
            }
        }

        if sent > 0 {
            debug!(sent, "flush complete");
        }
        Ok(sent)
    }

    async fn open_session(
        &mut self,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), ConnectError> {
        let attempt = match self.state {
            ConnectionState::Backoff { attempt } => attempt,
            _ => 0,
        };
        let connect_timeout = self.config.connect_timeout;
        let deadline = deadline.min(Instant::now() + connect_timeout);

        self.set_state(ConnectionState::Connecting);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectError::Cancelled),
            r = timeout_at(deadline, self.transport.connect()) => match r {
                Ok(r) => r,
                Err(_) => Err(ConnectError::Unreachable("handshake timed out".into())),
            },
        };

        match result {
            Ok(()) => {
                let session = Uuid::new_v4();
                self.session = Some(session);
                self.retry_at = None;
                self.set_state(ConnectionState::Connected);
                info!(
                    endpoint = %self.transport.endpoint(),
                    %session,
                    reconnect = attempt > 0,
                    "collector session established"
                );
                Ok(())
            }
            Err(ConnectError::Cancelled) => {
                self.release_session().await;
                self.set_state(ConnectionState::Disconnected);
                debug!("connect cancelled");
                Err(ConnectError::Cancelled)
            }
            Err(e) => {
                self.enter_backoff(attempt.saturating_add(1));
                warn!(
                    component = "delivery",
                    op = "connect",
                    endpoint = %self.transport.endpoint(),
                    attempt = attempt.saturating_add(1),
                    retry_in_ms = self.retry_in().unwrap_or_default().as_millis() as u64,
                    error = %e,
                    "collector connect failed"
                );
                Err(e)
            }
        }
    }

    fn enter_backoff(&mut self, attempt: u32) {
        let delay = self.config.backoff.delay_for_attempt(attempt);
        self.retry_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Backoff { attempt });
    }

    async fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(%session, "releasing collector session");
        }
        if tokio::time::timeout(SESSION_CLOSE_TIMEOUT, self.transport.close())
            .await
            .is_err()
        {
            debug!("session close timed out");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "connection state changed");
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCollector, FakeTransport};
    use chrono::Utc;
    use sentinel_telemetry::TelemetryEncoder;

    fn record(anomalies: u64) -> TelemetryRecord {
        TelemetryEncoder::new("agent-test").encode("/t", anomalies, Utc::now())
    }

    fn client(collector: &FakeCollector, capacity: usize) -> DeliveryClient<FakeTransport> {
        let config = DeliveryConfig {
            queue_capacity: capacity,
            ..DeliveryConfig::default()
        };
        DeliveryClient::new(collector.transport(), config, CancellationToken::new())
    }

    fn queued(client: &DeliveryClient<FakeTransport>) -> Vec<u64> {
        client
            .queue()
            .iter()
            .map(|p| p.record().anomaly_count())
            .collect()
    }

    fn delivered(collector: &FakeCollector) -> Vec<u64> {
        collector
            .delivered()
            .iter()
            .map(|r| r.payload.anomalies)
            .collect()
    }

    #[tokio::test]
    async fn connect_moves_to_connected() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 4);
        assert_eq!(c.state(), ConnectionState::Disconnected);

        c.connect().await.unwrap();
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(collector.connects(), 1);
    }

    #[tokio::test]
    async fn connect_failure_enters_backoff() {
        let collector = FakeCollector::new();
        collector.reject_auth();
        let mut c = client(&collector, 4);

        let err = c.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::AuthFailed(_)));
        assert_eq!(c.state(), ConnectionState::Backoff { attempt: 1 });
        assert!(c.retry_in().is_some());
    }

    #[tokio::test]
    async fn enqueue_reports_eviction() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 2);

        assert_eq!(c.enqueue(record(1)), EnqueueOutcome::Accepted);
        assert_eq!(c.enqueue(record(2)), EnqueueOutcome::Accepted);
        match c.enqueue(record(3)) {
            EnqueueOutcome::Dropped { evicted } => assert_eq!(evicted.anomaly_count(), 1),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(queued(&c), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_collector_keeps_latest_records() {
        let collector = FakeCollector::new();
        collector.set_reachable(false);
        let mut c = client(&collector, 2);
        assert!(c.connect().await.is_err());

        for n in 1..=3 {
            c.enqueue(record(n));
            assert!(c.flush().await.is_err());
            tokio::time::advance(Duration::from_secs(5)).await;
        }

        assert_eq!(queued(&c), vec![2, 3]);
        assert!(collector.delivered().is_empty());
    }

    #[tokio::test]
    async fn flush_sends_fifo_and_is_idempotent() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 8);
        c.connect().await.unwrap();

        for n in 1..=4 {
            c.enqueue(record(n));
        }
        assert_eq!(c.flush().await.unwrap(), 4);
        assert!(c.queue().is_empty());

        assert_eq!(c.flush().await.unwrap(), 0);
        assert_eq!(collector.sends(), 4);
        assert_eq!(delivered(&collector), vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_send_keeps_unacked_records() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 8);
        c.connect().await.unwrap();

        for n in 1..=5 {
            c.enqueue(record(n));
        }
        collector.fail_after(2);

        let err = c.flush().await.unwrap_err();
        assert_eq!(
            err,
            DeliveryError::PartialSend {
                sent: 2,
                remaining: 3
            }
        );
        assert_eq!(c.state(), ConnectionState::Backoff { attempt: 1 });
        assert_eq!(queued(&c), vec![3, 4, 5]);
        assert!(c.queue().front().unwrap().is_retry());

        // Still inside the backoff window: nothing is attempted.
        collector.heal();
        let connects = collector.connects();
        assert_eq!(c.flush().await, Err(DeliveryError::TransportClosed));
        assert_eq!(collector.connects(), connects);

        tokio::time::advance(Duration::from_millis(1300)).await;
        assert_eq!(c.flush().await.unwrap(), 3);
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(delivered(&collector), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_connect_failures_grow_attempt() {
        let collector = FakeCollector::new();
        collector.set_reachable(false);
        let mut c = client(&collector, 4);
        c.enqueue(record(1));

        assert!(c.connect().await.is_err());
        assert_eq!(c.state(), ConnectionState::Backoff { attempt: 1 });

        tokio::time::advance(Duration::from_millis(1300)).await;
        assert!(c.flush().await.is_err());
        assert_eq!(c.state(), ConnectionState::Backoff { attempt: 2 });

        let wait = c.retry_in().unwrap();
        assert!(wait >= Duration::from_millis(1590), "wait was {wait:?}");

        tokio::time::advance(Duration::from_millis(2500)).await;
        collector.set_reachable(true);
        assert_eq!(c.flush().await.unwrap(), 1);
        assert_eq!(c.state(), ConnectionState::Connected);
        assert_eq!(c.retry_in(), None);
    }

    #[tokio::test]
    async fn rejected_record_is_discarded() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 4);
        c.connect().await.unwrap();
        c.enqueue(record(1));
        c.enqueue(record(2));
        collector.reject_next(1);

        assert_eq!(c.flush().await.unwrap(), 1);
        assert!(c.queue().is_empty());
        assert_eq!(delivered(&collector), vec![2]);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_is_idempotent() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 4);
        c.connect().await.unwrap();
        c.enqueue(record(7));

        let report = c.shutdown().await;
        assert_eq!(
            report,
            ShutdownReport {
                flushed: 1,
                abandoned: 0
            }
        );
        assert!(c.is_shut_down());
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(collector.closes(), 1);

        assert_eq!(c.shutdown().await, ShutdownReport::default());
        assert_eq!(collector.closes(), 1);

        c.enqueue(record(8));
        assert_eq!(c.flush().await, Err(DeliveryError::TransportClosed));
    }

    #[tokio::test]
    async fn shutdown_ignores_backoff_timer() {
        let collector = FakeCollector::new();
        collector.set_reachable(false);
        let mut c = client(&collector, 4);
        assert!(c.connect().await.is_err());
        c.enqueue(record(1));

        collector.set_reachable(true);
        let report = c.shutdown().await;
        assert_eq!(report.flushed, 1);
        assert_eq!(delivered(&collector), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_bounded_when_sends_hang() {
        let collector = FakeCollector::new();
        let mut c = client(&collector, 4);
        c.connect().await.unwrap();
        c.enqueue(record(1));
        c.enqueue(record(2));
        collector.hang_sends(true);

        let started = Instant::now();
        let report = c.shutdown().await;
        assert!(started.elapsed() <= Duration::from_secs(2) + SESSION_CLOSE_TIMEOUT);
        assert_eq!(
            report,
            ShutdownReport {
                flushed: 0,
                abandoned: 2
            }
        );
    }

    #[tokio::test]
    async fn cancelled_flush_keeps_record() {
        let collector = FakeCollector::new();
        let cancel = CancellationToken::new();
        let mut c = DeliveryClient::new(collector.transport(), DeliveryConfig::default(), cancel.clone());
        c.connect().await.unwrap();
        c.enqueue(record(1));
        collector.hang_sends(true);

        cancel.cancel();
        assert_eq!(c.flush().await, Err(DeliveryError::Cancelled));
        assert_eq!(queued(&c), vec![1]);
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn cancelled_connect_is_not_backoff() {
        let collector = FakeCollector::new();
        let cancel = CancellationToken::new();
        let mut c = DeliveryClient::new(collector.transport(), DeliveryConfig::default(), cancel.clone());
        cancel.cancel();

        assert_eq!(c.connect().await, Err(ConnectError::Cancelled));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(collector.connects(), 0);
    }
}
