//! The [`ScanProvider`] trait and its error type.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Opaque scan result. Semantics are owned by the provider.
pub type AnomalyCount = u64;

/// A boxed future returned by provider methods.
pub type ScanFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ScanError>> + Send + 'a>>;

/// Errors produced by a scan provider.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O failure on {target}: {source}")]
    IoFailure {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub(crate) fn io(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoFailure {
            target: target.into(),
            source,
        }
    }
}

/// A capability that scans a target and counts anomalies.
///
/// Providers must not touch state shared with the orchestrator. The
/// orchestrator calls [`start`](Self::start) once before the first scan and
/// [`shutdown`](Self::shutdown) once after the last.
pub trait ScanProvider: Send + Sync {
    /// Short name used in log records.
    fn name(&self) -> &str;

    /// Prepares the provider. A failure here aborts agent startup.
    fn start(&mut self) -> ScanFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Performs one scan of `target`.
    ///
    /// Callers enforce the time bound through [`bounded_scan`]; the future
    /// may be dropped at any await point.
    fn scan<'a>(&'a self, target: &'a str) -> ScanFuture<'a, AnomalyCount>;

    /// Releases whatever [`start`](Self::start) acquired.
    fn shutdown(&mut self) -> ScanFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs a scan, turning an overrun of `timeout` into [`ScanError::Timeout`].
pub async fn bounded_scan<P>(
    provider: &P,
    target: &str,
    timeout: Duration,
) -> Result<AnomalyCount, ScanError>
where
    P: ScanProvider + ?Sized,
{
    match tokio::time::timeout(timeout, provider.scan(target)).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{ScanStep, ScriptedScanner};

    #[tokio::test]
    async fn bounded_scan_passes_result_through() {
        let scanner = ScriptedScanner::new([ScanStep::Count(7)]);
        let count = bounded_scan(&scanner, "/tmp", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_scan_times_out() {
        let scanner = ScriptedScanner::new([ScanStep::Hang]);
        let err = bounded_scan(&scanner, "/tmp", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn bounded_scan_passes_errors_through() {
        let scanner = ScriptedScanner::new([ScanStep::Fail]);
        let err = bounded_scan(&scanner, "/nowhere", Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            ScanError::IoFailure { target, .. } => assert_eq!(target, "/nowhere"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn error_display_includes_target() {
        let err = ScanError::io("/proc/mem", std::io::Error::other("denied"));
        assert_eq!(err.to_string(), "I/O failure on /proc/mem: denied");
    }
}
