//! Scripted scan provider for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::provider::{AnomalyCount, ScanError, ScanFuture, ScanProvider};

/// One scripted scan outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// Report this many anomalies.
    Count(AnomalyCount),
    /// Fail with an I/O error.
    Fail,
    /// Never complete (exercises timeouts and cancellation).
    Hang,
}

/// Call counters shared between a [`ScriptedScanner`] and the test.
#[derive(Debug, Default)]
pub struct ScannerCalls {
    start: AtomicUsize,
    scan: AtomicUsize,
    shutdown: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

impl ScannerCalls {
    pub fn starts(&self) -> usize {
        self.start.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.scan.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Targets passed to `scan`, in call order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

/// Scan provider that replays a fixed script.
///
/// Once the script is exhausted every scan reports zero anomalies.
pub struct ScriptedScanner {
    steps: Mutex<VecDeque<ScanStep>>,
    calls: Arc<ScannerCalls>,
    fail_start: bool,
    hang_shutdown: bool,
}

impl ScriptedScanner {
    pub fn new(steps: impl IntoIterator<Item = ScanStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Arc::new(ScannerCalls::default()),
            fail_start: false,
            hang_shutdown: false,
        }
    }

    /// Makes `start` fail with an I/O error.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Makes `shutdown` never complete.
    pub fn hanging_shutdown(mut self) -> Self {
        self.hang_shutdown = true;
        self
    }

    /// Returns the shared call counters.
    pub fn calls(&self) -> Arc<ScannerCalls> {
        Arc::clone(&self.calls)
    }

    fn next_step(&self) -> ScanStep {
        self.steps
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(ScanStep::Count(0))
    }
}

impl ScanProvider for ScriptedScanner {
    fn name(&self) -> &str {
        "scripted-scanner"
    }

    fn start(&mut self) -> ScanFuture<'_, ()> {
        Box::pin(async move {
            self.calls.start.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ScanError::io(
                    "scripted-scanner",
                    std::io::Error::other("scripted start failure"),
                ));
            }
            Ok(())
        })
    }

    fn scan<'a>(&'a self, target: &'a str) -> ScanFuture<'a, AnomalyCount> {
        Box::pin(async move {
            self.calls.scan.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut targets) = self.calls.targets.lock() {
                targets.push(target.to_string());
            }

            match self.next_step() {
                ScanStep::Count(n) => Ok(n),
                ScanStep::Fail => Err(ScanError::io(
                    target,
                    std::io::Error::other("scripted scan failure"),
                )),
                ScanStep::Hang => std::future::pending().await,
            }
        })
    }

    fn shutdown(&mut self) -> ScanFuture<'_, ()> {
        Box::pin(async move {
            self.calls.shutdown.fetch_add(1, Ordering::SeqCst);
            if self.hang_shutdown {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}
