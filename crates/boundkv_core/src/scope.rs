//! Transaction scopes.
//!
//! A scope is one transaction against the store's container. The
//! transaction is begun, populated and committed inside a single
//! non-suspending step; only the completion signal is awaited. Awaiting
//! anything between `begin` and `commit` is impossible by construction:
//! the body is a plain closure, and the transaction is consumed by commit.

use crate::config::CONTAINER_NAME;
use crate::connection::Connection;
use crate::deadline::race_with_deadline;
use crate::error::{CoreError, CoreResult};
use crate::stats::StoreStats;
use boundkv_storage::{EngineTransaction, Request, TransactionMode};
use std::fmt;
use std::time::Duration;

/// Lifecycle of one store operation.
///
/// ```text
/// NotStarted -> ConnectionPending -> TransactionStarted -> Completed
///                      |                     |          -> Failed
///                      +---------------------+-------> -> TimedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    /// Nothing has happened yet.
    NotStarted,
    /// Waiting for the connection.
    ConnectionPending,
    /// The transaction was committed; waiting for its signal.
    TransactionStarted,
    /// The transaction signalled completion.
    Completed,
    /// The open or the transaction reported an error.
    Failed,
    /// A deadline passed first.
    TimedOut,
}

impl OperationState {
    /// Returns true for `Completed`, `Failed` and `TimedOut`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not-started",
            Self::ConnectionPending => "connection-pending",
            Self::TransactionStarted => "transaction-started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the state of a single operation.
#[derive(Debug)]
pub(crate) struct OperationTracker<'a> {
    label: &'a str,
    state: OperationState,
}

impl<'a> OperationTracker<'a> {
    pub(crate) fn new(label: &'a str) -> Self {
        Self {
            label,
            state: OperationState::NotStarted,
        }
    }

    pub(crate) fn state(&self) -> OperationState {
        self.state
    }

    /// Moves to `next`. Terminal states are final.
    pub(crate) fn advance(&mut self, next: OperationState) {
        if self.state.is_terminal() {
            return;
        }
        tracing::debug!(label = self.label, from = %self.state, to = %next, "operation state");
        self.state = next;
    }

    /// Moves to the terminal state matching `outcome`.
    pub(crate) fn finish<T>(&mut self, outcome: &CoreResult<T>) {
        let next = match outcome {
            Ok(_) => OperationState::Completed,
            Err(err) if err.is_timeout() => OperationState::TimedOut,
            Err(_) => OperationState::Failed,
        };
        self.advance(next);
    }
}

/// The transaction and container handed to an operation body.
///
/// Every method enqueues synchronously and returns the operation's result
/// slot, which is filled once the transaction completes.
pub struct Scope<'a> {
    txn: &'a mut dyn EngineTransaction,
    stats: &'a StoreStats,
}

impl<'a> Scope<'a> {
    fn new(txn: &'a mut dyn EngineTransaction, stats: &'a StoreStats) -> Self {
        Self { txn, stats }
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.txn.mode()
    }

    /// Returns the name of the container the transaction is bound to.
    #[must_use]
    pub fn container(&self) -> &'static str {
        CONTAINER_NAME
    }

    /// Returns the number of operations enqueued so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.txn.len()
    }

    /// Returns true if nothing has been enqueued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.txn.is_empty()
    }

    /// Enqueues a lookup of `key`.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` if the engine rejects the operation.
    pub fn get(&mut self, key: &str) -> CoreResult<Request<Option<String>>> {
        let request = self.txn.get(key).map_err(|e| CoreError::from_transaction(&e))?;
        self.stats.record_read();
        Ok(request)
    }

    /// Enqueues an upsert of `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` in a read-only scope.
    pub fn put(&mut self, key: &str, value: &str) -> CoreResult<Request<()>> {
        let request = self
            .txn
            .put(key, value)
            .map_err(|e| CoreError::from_transaction(&e))?;
        self.stats.record_write();
        Ok(request)
    }

    /// Enqueues removal of every entry.
    ///
    /// # Errors
    ///
    /// Returns `Transaction` in a read-only scope.
    pub fn clear(&mut self) -> CoreResult<Request<()>> {
        let request = self.txn.clear().map_err(|e| CoreError::from_transaction(&e))?;
        self.stats.record_clear();
        Ok(request)
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("mode", &self.mode())
            .field("container", &self.container())
            .field("len", &self.len())
            .finish()
    }
}

/// Runs `body` in a fresh transaction on `connection` and waits for the
/// transaction to complete, for at most `timeout`.
///
/// If `body` fails, the transaction is dropped uncommitted and nothing is
/// applied. The value is read from the slot `body` returned once the engine
/// signals completion.
pub(crate) async fn run_in_scope<T, F>(
    connection: &Connection,
    mode: TransactionMode,
    label: &str,
    timeout: Duration,
    stats: &StoreStats,
    tracker: &mut OperationTracker<'_>,
    body: F,
) -> CoreResult<T>
where
    F: FnOnce(&mut Scope<'_>) -> CoreResult<Request<T>>,
{
    let (completion, result) = {
        let mut txn = connection.begin(mode)?;
        let result = body(&mut Scope::new(txn.as_mut(), stats))?;
        stats.record_transaction_start();
        (txn.commit(), result)
    };
    tracker.advance(OperationState::TransactionStarted);

    let settled = async move {
        completion
            .await
            .map_err(|e| CoreError::from_transaction(&e))?;
        result
            .take()
            .ok_or_else(|| CoreError::transaction("completed without a result"))
    };
    race_with_deadline(settled, label, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundkv_storage::{
        upgrade, Completion, CompletionSignal, EngineConnection, InMemoryEngine, OpenEvent,
        StorageEngine, StorageResult,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    async fn open(engine: &InMemoryEngine) -> Connection {
        let request = engine.open(
            "scope-test",
            1,
            upgrade(|schema| schema.create_container(CONTAINER_NAME)),
        );
        match request.await {
            OpenEvent::Success(conn) => Connection::new(conn),
            other => panic!("unexpected open outcome: {other:?}"),
        }
    }

    async fn run<T, F>(connection: &Connection, mode: TransactionMode, body: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> CoreResult<Request<T>>,
    {
        let stats = StoreStats::new();
        let mut tracker = OperationTracker::new("test");
        run_in_scope(
            connection,
            mode,
            "test",
            Duration::from_millis(100),
            &stats,
            &mut tracker,
            body,
        )
        .await
    }

    /// Connection whose transactions never signal.
    #[derive(Debug, Default)]
    struct SilentConnection {
        held: Arc<Mutex<Vec<CompletionSignal>>>,
    }

    struct SilentTransaction {
        held: Arc<Mutex<Vec<CompletionSignal>>>,
        ops: usize,
    }

    impl EngineConnection for SilentConnection {
        fn name(&self) -> &str {
            "silent"
        }

        fn version(&self) -> u32 {
            1
        }

        fn container_names(&self) -> Vec<String> {
            vec![CONTAINER_NAME.to_string()]
        }

        fn transaction(
            &self,
            _container: &str,
            _mode: TransactionMode,
        ) -> StorageResult<Box<dyn EngineTransaction>> {
            Ok(Box::new(SilentTransaction {
                held: Arc::clone(&self.held),
                ops: 0,
            }))
        }

        fn close(&self) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    impl EngineTransaction for SilentTransaction {
        fn mode(&self) -> TransactionMode {
            TransactionMode::ReadWrite
        }

        fn get(&mut self, _key: &str) -> StorageResult<Request<Option<String>>> {
            self.ops += 1;
            Ok(Request::pending())
        }

        fn put(&mut self, _key: &str, _value: &str) -> StorageResult<Request<()>> {
            self.ops += 1;
            Ok(Request::pending())
        }

        fn clear(&mut self) -> StorageResult<Request<()>> {
            self.ops += 1;
            Ok(Request::pending())
        }

        fn len(&self) -> usize {
            self.ops
        }

        fn commit(self: Box<Self>) -> Completion {
            let (signal, completion) = Completion::channel();
            self.held.lock().push(signal);
            completion
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!OperationState::NotStarted.is_terminal());
        assert!(!OperationState::ConnectionPending.is_terminal());
        assert!(!OperationState::TransactionStarted.is_terminal());
        assert!(OperationState::Completed.is_terminal());
        assert!(OperationState::Failed.is_terminal());
        assert!(OperationState::TimedOut.is_terminal());
    }

    #[test]
    fn tracker_stops_at_terminal_state() {
        let mut tracker = OperationTracker::new("op");
        tracker.advance(OperationState::ConnectionPending);
        tracker.finish::<()>(&Err(CoreError::timeout("op")));
        assert_eq!(tracker.state(), OperationState::TimedOut);

        tracker.advance(OperationState::Completed);
        assert_eq!(tracker.state(), OperationState::TimedOut);
    }

    #[tokio::test]
    async fn put_then_get_in_separate_scopes() {
        let engine = InMemoryEngine::new();
        let conn = open(&engine).await;

        run(&conn, TransactionMode::ReadWrite, |scope| scope.put("k", "v"))
            .await
            .unwrap();
        let value = run(&conn, TransactionMode::ReadOnly, |scope| scope.get("k"))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn operations_in_one_scope_run_in_order() {
        let engine = InMemoryEngine::new();
        let conn = open(&engine).await;

        let value = run(&conn, TransactionMode::ReadWrite, |scope| {
            scope.put("a", "1")?;
            scope.clear()?;
            scope.put("a", "2")?;
            scope.get("a")
        })
        .await
        .unwrap();
        assert_eq!(value.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn write_in_read_only_scope_fails() {
        let engine = InMemoryEngine::new();
        let conn = open(&engine).await;

        let err = run(&conn, TransactionMode::ReadOnly, |scope| scope.put("k", "v"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transaction);
    }

    #[tokio::test]
    async fn failed_body_applies_nothing() {
        let engine = InMemoryEngine::new();
        let conn = open(&engine).await;

        let err = run::<(), _>(&conn, TransactionMode::ReadWrite, |scope| {
            scope.put("k", "v")?;
            Err(CoreError::transaction("body gave up"))
        })
        .await
        .unwrap_err();
        assert_eq!(err, CoreError::transaction("body gave up"));

        let value = run(&conn, TransactionMode::ReadOnly, |scope| scope.get("k"))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn closed_connection_is_a_transaction_error() {
        let engine = InMemoryEngine::new();
        let conn = open(&engine).await;
        conn.close();

        let err = run(&conn, TransactionMode::ReadOnly, |scope| scope.get("k"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transaction);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_transaction_times_out() {
        let silent = Arc::new(SilentConnection::default());
        let conn = Connection::new(silent.clone());

        let started = tokio::time::Instant::now();
        let err = run(&conn, TransactionMode::ReadWrite, |scope| scope.put("k", "v"))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::timeout("test"));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(silent.held.lock().len(), 1);
    }

    #[tokio::test]
    async fn dropped_signal_is_a_transaction_error() {
        let silent = Arc::new(SilentConnection::default());
        let conn = Connection::new(silent.clone());

        let pending = run(&conn, TransactionMode::ReadWrite, |scope| scope.put("k", "v"));
        let drop_signals = async {
            tokio::task::yield_now().await;
            silent.held.lock().clear();
        };
        let (result, ()) = tokio::join!(pending, drop_signals);
        assert_eq!(result.unwrap_err().kind(), crate::error::ErrorKind::Transaction);
    }

    #[tokio::test]
    async fn stats_count_enqueued_operations() {
        let engine = InMemoryEngine::new();
        let conn = open(&engine).await;
        let stats = StoreStats::new();
        let mut tracker = OperationTracker::new("count");

        run_in_scope(
            &conn,
            TransactionMode::ReadWrite,
            "count",
            Duration::from_millis(100),
            &stats,
            &mut tracker,
            |scope| {
                scope.put("a", "1")?;
                scope.put("b", "2")?;
                scope.get("a")
            },
        )
        .await
        .unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.transactions_started, 1);
        assert_eq!(tracker.state(), OperationState::TransactionStarted);
    }
}
