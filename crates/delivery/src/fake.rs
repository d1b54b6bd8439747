//! In-memory collector for tests.
//!
//! [`FakeCollector`] is the test's handle: it scripts failures and records
//! what was delivered. [`FakeTransport`] is what the delivery client owns.

use std::sync::{Arc, Mutex, PoisonError};

use sentinel_protocol::{CollectorAck, WireRecord};

use crate::error::{ConnectError, TransportError};
use crate::transport::{Transport, TransportFuture};

#[derive(Debug)]
struct CollectorState {
    reachable: bool,
    auth_ok: bool,
    hang_sends: bool,
    /// Sends accepted before the session breaks (`None` = unlimited).
    send_budget: Option<usize>,
    reject_next: usize,
    delivered: Vec<WireRecord>,
    connects: usize,
    sends: usize,
    closes: usize,
}

/// Test handle for a scripted collector.
#[derive(Debug, Clone)]
pub struct FakeCollector {
    state: Arc<Mutex<CollectorState>>,
}

impl Default for FakeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCollector {
    /// A reachable collector that acks everything.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CollectorState {
                reachable: true,
                auth_ok: true,
                hang_sends: false,
                send_budget: None,
                reject_next: 0,
                delivered: Vec::new(),
                connects: 0,
                sends: 0,
                closes: 0,
            })),
        }
    }

    /// Creates a transport bound to this collector.
    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            state: Arc::clone(&self.state),
            open: false,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut CollectorState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Unreachable collectors refuse connects and break open sessions.
    pub fn set_reachable(&self, reachable: bool) {
        self.with(|s| s.reachable = reachable);
    }

    pub fn reject_auth(&self) {
        self.with(|s| s.auth_ok = false);
    }

    /// Makes every send hang until dropped.
    pub fn hang_sends(&self, hang: bool) {
        self.with(|s| s.hang_sends = hang);
    }

    /// Accepts `n` more sends, then breaks the session on the next one.
    pub fn fail_after(&self, n: usize) {
        self.with(|s| s.send_budget = Some(n));
    }

    /// Clears any send budget set by [`fail_after`](Self::fail_after).
    pub fn heal(&self) {
        self.with(|s| s.send_budget = None);
    }

    /// Answers the next `n` sends with a negative ack.
    pub fn reject_next(&self, n: usize) {
        self.with(|s| s.reject_next = n);
    }

    /// Records acknowledged so far, in arrival order.
    pub fn delivered(&self) -> Vec<WireRecord> {
        self.with(|s| s.delivered.clone())
    }

    pub fn connects(&self) -> usize {
        self.with(|s| s.connects)
    }

    pub fn sends(&self) -> usize {
        self.with(|s| s.sends)
    }

    pub fn closes(&self) -> usize {
        self.with(|s| s.closes)
    }
}

enum SendPlan {
    Reply(Result<CollectorAck, TransportError>),
    Hang,
}

/// Transport half of a [`FakeCollector`].
#[derive(Debug)]
pub struct FakeTransport {
    state: Arc<Mutex<CollectorState>>,
    open: bool,
}

impl FakeTransport {
    fn with<R>(&self, f: impl FnOnce(&mut CollectorState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn plan_send(&mut self, record: &WireRecord) -> SendPlan {
        if !self.open {
            return SendPlan::Reply(Err(TransportError::Closed));
        }
        let plan = self.with(|s| {
            s.sends += 1;
            if s.hang_sends {
                return SendPlan::Hang;
            }
            if !s.reachable || s.send_budget == Some(0) {
                return SendPlan::Reply(Err(TransportError::Closed));
            }
            if let Some(budget) = s.send_budget.as_mut() {
                *budget -= 1;
            }
            if s.reject_next > 0 {
                s.reject_next -= 1;
                return SendPlan::Reply(Ok(CollectorAck::rejected("rejected by fake collector")));
            }
            s.delivered.push(record.clone());
            SendPlan::Reply(Ok(CollectorAck::accepted(format!("alert-{}", s.delivered.len()))))
        });
        if matches!(plan, SendPlan::Reply(Err(_))) {
            self.open = false;
        }
        plan
    }
}

impl Transport for FakeTransport {
    fn endpoint(&self) -> &str {
        "fake://collector"
    }

    fn connect(&mut self) -> TransportFuture<'_, Result<(), ConnectError>> {
        Box::pin(async move {
            let result = self.with(|s| {
                s.connects += 1;
                if !s.reachable {
                    Err(ConnectError::Unreachable("fake collector offline".into()))
                } else if !s.auth_ok {
                    Err(ConnectError::AuthFailed("fake collector denied token".into()))
                } else {
                    Ok(())
                }
            });
            self.open = result.is_ok();
            result
        })
    }

    fn send<'a>(
        &'a mut self,
        record: &'a WireRecord,
    ) -> TransportFuture<'a, Result<CollectorAck, TransportError>> {
        Box::pin(async move {
            match self.plan_send(record) {
                SendPlan::Reply(result) => result,
                SendPlan::Hang => std::future::pending().await,
            }
        })
    }

    fn close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.open {
                self.open = false;
                self.with(|s| s.closes += 1);
            }
        })
    }
}
