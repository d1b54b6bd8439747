//! OS signal handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels the agent exactly once, however many signals arrive.
#[derive(Debug)]
pub struct ShutdownTrigger {
    cancel: CancellationToken,
    fired: AtomicBool,
}

impl ShutdownTrigger {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            fired: AtomicBool::new(false),
        }
    }

    /// Requests shutdown. Returns `true` only for the first call.
    pub fn fire(&self, reason: &str) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            info!(reason, "shutdown already in progress, ignoring");
            return false;
        }
        info!(reason, "shutdown requested");
        self.cancel.cancel();
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Forwards SIGINT and SIGTERM (ctrl-c on other platforms) to `trigger`.
///
/// Must be called from within a tokio runtime. The task runs until aborted.
pub fn spawn_signal_listener(trigger: Arc<ShutdownTrigger>) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        Ok(tokio::spawn(async move {
            loop {
                let reason = tokio::select! {
                    s = sigint.recv() => s.map(|_| "SIGINT"),
                    s = sigterm.recv() => s.map(|_| "SIGTERM"),
                };
                match reason {
                    Some(reason) => {
                        trigger.fire(reason);
                    }
                    None => {
                        warn!("signal stream closed");
                        break;
                    }
                }
            }
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("ctrl-c listener failed: {e}");
                    break;
                }
                trigger.fire("ctrl-c");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once() {
        let cancel = CancellationToken::new();
        let trigger = ShutdownTrigger::new(cancel.clone());
        assert!(!trigger.has_fired());

        assert!(trigger.fire("SIGINT"));
        assert!(cancel.is_cancelled());
        assert!(trigger.has_fired());

        assert!(!trigger.fire("SIGTERM"));
        assert!(!trigger.fire("SIGINT"));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn concurrent_fires_cancel_once() {
        let trigger = Arc::new(ShutdownTrigger::new(CancellationToken::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = Arc::clone(&trigger);
                std::thread::spawn(move || t.fire("test"))
            })
            .collect();

        let firsts = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(firsts, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listener_starts_inside_runtime() {
        let trigger = Arc::new(ShutdownTrigger::new(CancellationToken::new()));
        let handle = spawn_signal_listener(Arc::clone(&trigger)).unwrap();
        assert!(!trigger.has_fired());
        handle.abort();
    }
}
