//! Filesystem scan provider.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::platform;
use crate::provider::{AnomalyCount, ScanError, ScanFuture, ScanProvider};

/// Directory entries inspected per scan by default.
const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Production scan provider that inspects permissions under a path.
///
/// A file target counts as one anomaly when its mode is suspicious. A
/// directory target counts its suspicious direct children. The work runs on
/// tokio's blocking pool; a timed-out scan finishes there in the background
/// and its result is discarded.
#[derive(Debug)]
pub struct PathScanner {
    max_entries: usize,
    started: AtomicBool,
}

impl PathScanner {
    /// Creates a scanner with the default entry limit.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Creates a scanner that inspects at most `max_entries` directory entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            started: AtomicBool::new(false),
        }
    }

    /// Returns `true` between `start` and `shutdown`.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }
}

impl Default for PathScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanProvider for PathScanner {
    fn name(&self) -> &str {
        "path-scanner"
    }

    fn start(&mut self) -> ScanFuture<'_, ()> {
        Box::pin(async move {
            self.started.store(true, Ordering::Relaxed);
            debug!(max_entries = self.max_entries, "path scanner started");
            Ok(())
        })
    }

    fn scan<'a>(&'a self, target: &'a str) -> ScanFuture<'a, AnomalyCount> {
        let owned = target.to_string();
        let max_entries = self.max_entries;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || scan_path(Path::new(&owned), max_entries))
                .await
                .map_err(|e| ScanError::io(target, std::io::Error::other(e)))?
        })
    }

    fn shutdown(&mut self) -> ScanFuture<'_, ()> {
        Box::pin(async move {
            self.started.store(false, Ordering::Relaxed);
            debug!("path scanner stopped");
            Ok(())
        })
    }
}

/// Counts suspicious entries at `target`.
fn scan_path(target: &Path, max_entries: usize) -> Result<AnomalyCount, ScanError> {
    let shown = target.display().to_string();
    let meta = std::fs::symlink_metadata(target).map_err(|e| ScanError::io(&shown, e))?;

    if !meta.is_dir() {
        return Ok(AnomalyCount::from(platform::is_suspicious(&meta)));
    }

    let entries = std::fs::read_dir(target).map_err(|e| ScanError::io(&shown, e))?;
    let mut count: AnomalyCount = 0;

    for entry in entries.take(max_entries) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                trace!(path = %shown, "skipping unreadable entry: {e}");
                continue;
            }
        };
        // DirEntry::metadata does not follow symlinks.
        match entry.metadata() {
            Ok(m) if platform::is_suspicious(&m) => {
                trace!(path = %entry.path().display(), "suspicious entry");
                count += 1;
            }
            Ok(_) => {}
            Err(e) => trace!(path = %entry.path().display(), "metadata unavailable: {e}"),
        }
    }

    Ok(count)
}
