//! Store statistics.
//!
//! Counters for connection attempts and transaction outcomes, readable
//! while operations are in flight.
//!
//! # Usage
//!
//! ```rust,ignore
//! use boundkv_core::Store;
//!
//! let store = Store::in_memory();
//! store.mark_update().await?;
//!
//! let stats = store.stats();
//! println!("Open attempts: {}", stats.open_attempts);
//! println!("Timed out: {}", stats.transactions_timed_out);
//! ```

use crate::error::{CoreError, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    // Connection counters
    /// Open requests issued to the engine.
    open_attempts: AtomicU64,
    /// Open attempts that produced a connection.
    opens_succeeded: AtomicU64,
    /// Open attempts that failed, were blocked or timed out.
    opens_failed: AtomicU64,

    // Transaction counters
    /// Transactions handed to the engine.
    transactions_started: AtomicU64,
    /// Connected operations that completed in time.
    transactions_completed: AtomicU64,
    /// Connected operations that ended with an error other than a timeout.
    transactions_failed: AtomicU64,
    /// Connected operations that hit a deadline.
    transactions_timed_out: AtomicU64,

    // Operation counters
    /// Lookups enqueued.
    reads: AtomicU64,
    /// Upserts enqueued.
    writes: AtomicU64,
    /// Clears enqueued.
    clears: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_open_attempt(&self) {
        self.open_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open_success(&self) {
        self.opens_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open_failure(&self) {
        self.opens_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the terminal outcome of one operation that obtained a
    /// connection. Failures before that point count only as failed opens.
    pub(crate) fn record_outcome<T>(&self, outcome: &Result<T, CoreError>) {
        let counter = match outcome {
            Ok(_) => &self.transactions_completed,
            Err(err) if err.kind() == ErrorKind::Timeout => &self.transactions_timed_out,
            Err(_) => &self.transactions_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of open requests issued.
    pub fn open_attempts(&self) -> u64 {
        self.open_attempts.load(Ordering::Relaxed)
    }

    /// Returns the number of successful opens.
    pub fn opens_succeeded(&self) -> u64 {
        self.opens_succeeded.load(Ordering::Relaxed)
    }

    /// Returns the number of failed opens.
    pub fn opens_failed(&self) -> u64 {
        self.opens_failed.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the number of operations that completed.
    pub fn transactions_completed(&self) -> u64 {
        self.transactions_completed.load(Ordering::Relaxed)
    }

    /// Returns the number of operations that failed.
    pub fn transactions_failed(&self) -> u64 {
        self.transactions_failed.load(Ordering::Relaxed)
    }

    /// Returns the number of operations that timed out.
    pub fn transactions_timed_out(&self) -> u64 {
        self.transactions_timed_out.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            open_attempts: self.open_attempts(),
            opens_succeeded: self.opens_succeeded(),
            opens_failed: self.opens_failed(),
            transactions_started: self.transactions_started(),
            transactions_completed: self.transactions_completed(),
            transactions_failed: self.transactions_failed(),
            transactions_timed_out: self.transactions_timed_out(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Open requests issued.
    pub open_attempts: u64,
    /// Successful opens.
    pub opens_succeeded: u64,
    /// Failed, blocked or timed-out opens.
    pub opens_failed: u64,
    /// Transactions started.
    pub transactions_started: u64,
    /// Operations completed.
    pub transactions_completed: u64,
    /// Operations failed.
    pub transactions_failed: u64,
    /// Operations timed out.
    pub transactions_timed_out: u64,
    /// Lookups enqueued.
    pub reads: u64,
    /// Upserts enqueued.
    pub writes: u64,
    /// Clears enqueued.
    pub clears: u64,
}

impl StatsSnapshot {
    /// Returns the number of connected operations that reached a terminal
    /// state.
    pub fn operations_settled(&self) -> u64 {
        self.transactions_completed + self.transactions_failed + self.transactions_timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = StoreStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn outcomes_are_classified() {
        let stats = StoreStats::new();

        stats.record_outcome(&Ok::<(), CoreError>(()));
        stats.record_outcome::<()>(&Err(CoreError::timeout("x")));
        stats.record_outcome::<()>(&Err(CoreError::timeout("y")));
        stats.record_outcome::<()>(&Err(CoreError::transaction("z")));

        let snap = stats.snapshot();
        assert_eq!(snap.transactions_completed, 1);
        assert_eq!(snap.transactions_timed_out, 2);
        assert_eq!(snap.transactions_failed, 1);
        assert_eq!(snap.operations_settled(), 4);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(StoreStats::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_open_attempt();
                    s.record_write();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.open_attempts, 1000);
        assert_eq!(snap.writes, 1000);
    }
}
