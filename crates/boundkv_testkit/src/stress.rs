//! Stress tests for boundkv.
//!
//! These helpers drive many concurrent operations through one store, the
//! way a client loop does, and tally how each one ended.

use boundkv_core::{CoreResult, Store};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations that hit a deadline.
    pub timed_out_ops: usize,
    /// Operations that failed otherwise.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, timed_out: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + timed_out + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            timed_out_ops: timed_out,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Timed out: {}", self.timed_out_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent loops.
    pub loops: usize,
    /// Iterations per loop.
    pub iterations: usize,
    /// Pause between iterations of one loop.
    pub interval: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            loops: 100,
            iterations: 10,
            interval: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    successful: usize,
    timed_out: usize,
    failed: usize,
}

impl Tally {
    fn record<T>(&mut self, outcome: &CoreResult<T>) {
        match outcome {
            Ok(_) => self.successful += 1,
            Err(err) if err.is_timeout() => self.timed_out += 1,
            Err(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: Tally) {
        self.successful += other.successful;
        self.timed_out += other.timed_out;
        self.failed += other.failed;
    }

    fn finish(self, started: Instant) -> StressTestResult {
        StressTestResult::new(self.successful, self.timed_out, self.failed, started.elapsed())
    }
}

/// Issues `count` `mark_update` calls at once and waits for all of them.
///
/// The calls are polled concurrently on the current task, so they share
/// the store's single open attempt.
pub async fn stress_rapid_marks(store: &Store, count: usize) -> StressTestResult {
    let started = Instant::now();
    let outcomes = join_all((0..count).map(|_| store.mark_update())).await;

    let mut tally = Tally::default();
    for outcome in &outcomes {
        tally.record(outcome);
    }
    tally.finish(started)
}

/// Runs `config.loops` concurrent loops; each iteration marks an update
/// and reads it back.
///
/// Both operations of an iteration count towards the result.
pub async fn stress_client_loops(store: Arc<Store>, config: &StressConfig) -> StressTestResult {
    let started = Instant::now();
    let mut loops = JoinSet::new();

    for _ in 0..config.loops {
        let store = Arc::clone(&store);
        let iterations = config.iterations;
        let interval = config.interval;
        loops.spawn(async move {
            let mut tally = Tally::default();
            for _ in 0..iterations {
                tally.record(&store.mark_update().await);
                tally.record(&store.get_last_update().await);
                tokio::time::sleep(interval).await;
            }
            tally
        });
    }

    let mut total = Tally::default();
    while let Some(joined) = loops.join_next().await {
        match joined {
            Ok(tally) => total.merge(tally),
            Err(err) => {
                tracing::error!(error = %err, "stress loop panicked");
                total.failed += 1;
            }
        }
    }
    total.finish(started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn result_counts_add_up() {
        let result = StressTestResult::new(7, 2, 1, Duration::from_secs(2));
        assert_eq!(result.total_ops, 10);
        assert!((result.ops_per_second - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rapid_marks_all_succeed_in_memory() {
        let store = TestStore::memory();
        let result = stress_rapid_marks(&store, 50).await;
        assert_eq!(result.successful_ops, 50);
        assert!(store.get_last_update().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn client_loops_all_succeed_in_memory() {
        let store = Arc::new(TestStore::memory().store);
        let config = StressConfig {
            loops: 8,
            iterations: 3,
            interval: Duration::from_millis(1),
        };

        let result = stress_client_loops(store.clone(), &config).await;
        assert_eq!(result.total_ops, 48);
        assert_eq!(result.successful_ops, 48);
        assert_eq!(store.stats().open_attempts, 1);
    }
}
