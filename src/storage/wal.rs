//! Write-ahead logging hook.

use std::sync::atomic::{AtomicU64, Ordering};

/// Log sequence number.
pub type Lsn = u64;

/// Write-ahead logging hook.
///
/// The buffer pool accepts a handle so that page eviction can later
/// enforce the WAL rule (flush log records up to a dirty page's LSN before
/// writing the page). No log records are produced yet; only the LSN
/// counters exist.
pub struct LogManager {
    next_lsn: AtomicU64,
    flushed_lsn: AtomicU64,
}

impl LogManager {
    /// Creates a new log manager with LSN 0.
    pub fn new() -> Self {
        Self {
            next_lsn: AtomicU64::new(0),
            flushed_lsn: AtomicU64::new(0),
        }
    }

    /// Reserves and returns the next log sequence number.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the highest LSN known to be durable.
    pub fn flushed_lsn(&self) -> Lsn {
        self.flushed_lsn.load(Ordering::Acquire)
    }

    /// Records that all LSNs up to `lsn` are durable.
    pub fn set_flushed_lsn(&self, lsn: Lsn) {
        self.flushed_lsn.store(lsn, Ordering::Release);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsn_counters() {
        let log = LogManager::new();
        assert_eq!(log.next_lsn(), 0);
        assert_eq!(log.next_lsn(), 1);
        assert_eq!(log.flushed_lsn(), 0);

        log.set_flushed_lsn(1);
        assert_eq!(log.flushed_lsn(), 1);
    }
}
