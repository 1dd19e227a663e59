//! Lazily opened, memoized connection to the store.
//!
//! The [`ConnectionManager`] issues at most one open request at a time.
//! Callers arriving while an attempt is in flight join that attempt and
//! observe its outcome. A successful connection is kept for the lifetime of
//! the manager; a failed, blocked or timed-out attempt is forgotten so the
//! next caller starts a fresh one. So is an attempt whose callers all stopped
//! waiting before it settled.

use crate::config::{StoreConfig, CONTAINER_NAME};
use crate::deadline::race_with_deadline;
use crate::error::{CoreError, CoreResult};
use crate::stats::StoreStats;
use boundkv_storage::{
    upgrade, ConnectionRef, EngineTransaction, OpenEvent, StorageEngine, TransactionMode,
};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Label of the timeout raised by a stalled open.
pub const OPEN_TIMEOUT_LABEL: &str = "opening store";

/// An open handle to the store.
///
/// Cheap to clone; every clone refers to the same engine connection.
#[derive(Clone)]
pub struct Connection {
    inner: ConnectionRef,
}

impl Connection {
    pub(crate) fn new(inner: ConnectionRef) -> Self {
        Self { inner }
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Returns the version the store was opened at.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.version()
    }

    /// Returns the names of the store's containers.
    #[must_use]
    pub fn container_names(&self) -> Vec<String> {
        self.inner.container_names()
    }

    /// Returns true once the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Starts a transaction on the store's container.
    pub(crate) fn begin(&self, mode: TransactionMode) -> CoreResult<Box<dyn EngineTransaction>> {
        self.inner
            .transaction(CONTAINER_NAME, mode)
            .map_err(|e| CoreError::from_transaction(&e))
    }

    pub(crate) fn close(&self) {
        self.inner.close();
    }

    /// Returns true if both handles refer to the same engine connection.
    #[must_use]
    pub fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

type SharedOpen = Shared<BoxFuture<'static, CoreResult<Connection>>>;

/// An open attempt that callers can join.
struct PendingOpen {
    attempt: u64,
    waiters: usize,
    outcome: SharedOpen,
}

/// One caller's membership in a pending attempt.
///
/// Dropped before the attempt settles, it leaves the attempt; the last
/// caller to leave abandons it.
struct Waiter<'a> {
    manager: &'a ConnectionManager,
    attempt: u64,
    settled: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.manager.leave(self.attempt);
        }
    }
}

/// Opens the store once and hands the connection to every caller.
pub struct ConnectionManager {
    engine: Arc<dyn StorageEngine>,
    store_name: String,
    version: u32,
    open_timeout: Duration,
    ready: OnceLock<Connection>,
    pending: Mutex<Option<PendingOpen>>,
    attempts: AtomicU64,
    stats: Arc<StoreStats>,
}

impl ConnectionManager {
    /// Creates a manager; nothing is opened until [`ConnectionManager::get`].
    pub fn new(engine: Arc<dyn StorageEngine>, config: &StoreConfig, stats: Arc<StoreStats>) -> Self {
        Self {
            engine,
            store_name: config.store_name.clone(),
            version: config.version,
            open_timeout: config.open_timeout,
            ready: OnceLock::new(),
            pending: Mutex::new(None),
            attempts: AtomicU64::new(0),
            stats,
        }
    }

    /// Returns the connection, opening the store if needed.
    ///
    /// # Errors
    ///
    /// Returns `Blocked`, `Open` or `Timeout` if the attempt this call
    /// joined or started did not produce a connection.
    pub async fn get(&self) -> CoreResult<Connection> {
        if let Some(conn) = self.ready.get() {
            return Ok(conn.clone());
        }

        let (mut waiter, outcome) = {
            let mut pending = self.pending.lock();
            if let Some(conn) = self.ready.get() {
                return Ok(conn.clone());
            }
            let open = pending.get_or_insert_with(|| self.start_attempt());
            open.waiters += 1;
            let waiter = Waiter {
                manager: self,
                attempt: open.attempt,
                settled: false,
            };
            (waiter, open.outcome.clone())
        };

        let result = outcome.await;
        waiter.settled = true;
        self.settle(waiter.attempt, &result);
        result
    }

    /// Returns the cached connection without opening anything.
    #[must_use]
    pub fn cached(&self) -> Option<Connection> {
        self.ready.get().cloned()
    }

    /// Returns the number of open attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Closes the cached connection, if any.
    ///
    /// The closed connection stays cached: later operations fail instead of
    /// reopening the store.
    pub fn close(&self) {
        if let Some(conn) = self.ready.get() {
            tracing::debug!(store = %self.store_name, "closing connection");
            conn.close();
        }
    }

    fn start_attempt(&self) -> PendingOpen {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.record_open_attempt();
        tracing::debug!(store = %self.store_name, attempt, "opening store");

        let open = open_store(Arc::clone(&self.engine), self.store_name.clone(), self.version);
        let timeout = self.open_timeout;
        let outcome = async move { race_with_deadline(open, OPEN_TIMEOUT_LABEL, timeout).await }
            .boxed()
            .shared();
        PendingOpen {
            attempt,
            waiters: 0,
            outcome,
        }
    }

    /// Removes one waiter from `attempt`. An attempt nobody waits on is
    /// dropped along with its open request, so the next caller starts over.
    fn leave(&self, attempt: u64) {
        let mut pending = self.pending.lock();
        let Some(open) = pending.as_mut().filter(|open| open.attempt == attempt) else {
            return;
        };
        open.waiters -= 1;
        if open.waiters > 0 {
            return;
        }

        *pending = None;
        self.stats.record_open_failure();
        tracing::warn!(store = %self.store_name, attempt, "open attempt abandoned");
    }

    /// Publishes the outcome of `attempt`; only the first caller to settle it
    /// does any work.
    fn settle(&self, attempt: u64, result: &CoreResult<Connection>) {
        let mut pending = self.pending.lock();
        if !pending.as_ref().is_some_and(|open| open.attempt == attempt) {
            return;
        }

        match result {
            Ok(conn) => {
                if self.ready.set(conn.clone()).is_ok() {
                    self.stats.record_open_success();
                    tracing::info!(
                        store = %self.store_name,
                        version = conn.version(),
                        attempt,
                        "store opened"
                    );
                }
            }
            Err(err) => {
                self.stats.record_open_failure();
                tracing::warn!(store = %self.store_name, attempt, error = %err, "store open failed");
            }
        }
        *pending = None;
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("store_name", &self.store_name)
            .field("version", &self.version)
            .field("open", &self.ready.get().is_some())
            .field("attempts", &self.attempts())
            .finish()
    }
}

/// Issues one open request and maps its signal onto the error taxonomy.
async fn open_store(
    engine: Arc<dyn StorageEngine>,
    store_name: String,
    version: u32,
) -> CoreResult<Connection> {
    let request = engine.open(
        &store_name,
        version,
        upgrade(|schema| {
            if !schema.has_container(CONTAINER_NAME) {
                schema.create_container(CONTAINER_NAME)?;
            }
            Ok(())
        }),
    );

    match request.await {
        OpenEvent::Success(conn) => Ok(Connection::new(conn)),
        OpenEvent::Blocked => Err(CoreError::blocked(store_name)),
        OpenEvent::Error(err) => Err(CoreError::from_open(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundkv_storage::{InMemoryEngine, OpenRequest, OpenResponder, UpgradeFn};
    use std::sync::atomic::AtomicUsize;

    /// Engine that counts opens and can hold them without answering.
    #[derive(Default)]
    struct HoldingEngine {
        inner: InMemoryEngine,
        opens: AtomicUsize,
        hold: parking_lot::Mutex<bool>,
        held: parking_lot::Mutex<Vec<OpenResponder>>,
    }

    impl HoldingEngine {
        fn holding() -> Arc<Self> {
            let engine = Self::default();
            *engine.hold.lock() = true;
            Arc::new(engine)
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl StorageEngine for HoldingEngine {
        fn open(&self, name: &str, version: u32, upgrade: UpgradeFn) -> OpenRequest {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if *self.hold.lock() {
                let (responder, request) = OpenRequest::channel();
                self.held.lock().push(responder);
                request
            } else {
                self.inner.open(name, version, upgrade)
            }
        }
    }

    fn manager(engine: Arc<dyn StorageEngine>, config: StoreConfig) -> ConnectionManager {
        ConnectionManager::new(engine, &config, Arc::new(StoreStats::new()))
    }

    #[tokio::test]
    async fn first_get_opens_and_creates_container() {
        let engine = InMemoryEngine::new();
        let connections = manager(Arc::new(engine.clone()), StoreConfig::default());

        let conn = connections.get().await.unwrap();
        assert_eq!(conn.name(), "test-store");
        assert_eq!(conn.container_names(), vec![CONTAINER_NAME.to_string()]);
        assert_eq!(engine.image("test-store").unwrap().version, 1);
    }

    #[tokio::test]
    async fn later_gets_reuse_the_connection() {
        let engine = Arc::new(HoldingEngine::default());
        let connections = manager(engine.clone(), StoreConfig::default());

        let first = connections.get().await.unwrap();
        let second = connections.get().await.unwrap();
        assert!(first.same_as(&second));
        assert_eq!(engine.opens(), 1);
        assert!(connections.cached().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_gets_share_one_attempt() {
        let engine = HoldingEngine::holding();
        let connections = manager(engine.clone(), StoreConfig::default());

        let results = futures_util::future::join_all((0..16).map(|_| connections.get())).await;

        assert_eq!(engine.opens(), 1);
        let expected = CoreError::timeout(OPEN_TIMEOUT_LABEL);
        assert!(results
            .iter()
            .all(|r| r.as_ref().err() == Some(&expected)));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempt_is_not_memoized() {
        let engine = HoldingEngine::holding();
        let connections = manager(engine.clone(), StoreConfig::default());

        assert!(connections.get().await.unwrap_err().is_timeout());

        *engine.hold.lock() = false;
        let conn = connections.get().await.unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(engine.opens(), 2);
        assert_eq!(connections.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_left_by_every_caller_is_not_reused() {
        let engine = HoldingEngine::holding();
        let config = StoreConfig::default().open_timeout(Duration::from_secs(1));
        let connections = manager(engine.clone(), config);

        let gave_up = tokio::time::timeout(Duration::from_millis(100), connections.get()).await;
        assert!(gave_up.is_err());
        assert!(engine.held.lock()[0].is_abandoned());

        *engine.hold.lock() = false;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let conn = connections.get().await.unwrap();
        assert_eq!(conn.version(), 1);
        assert_eq!(engine.opens(), 2);
        assert_eq!(connections.attempts(), 2);
        assert_eq!(connections.stats.opens_failed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_survives_while_one_caller_still_waits() {
        let engine = HoldingEngine::holding();
        let config = StoreConfig::default().open_timeout(Duration::from_secs(1));
        let connections = manager(engine.clone(), config);

        let (impatient, patient) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(100), connections.get()),
            connections.get(),
        );
        assert!(impatient.is_err());
        assert_eq!(patient.unwrap_err(), CoreError::timeout(OPEN_TIMEOUT_LABEL));
        assert_eq!(engine.opens(), 1);
        assert_eq!(connections.stats.opens_failed(), 1);
    }

    #[tokio::test]
    async fn blocked_open_is_reported() {
        let engine = InMemoryEngine::new();
        let old = manager(Arc::new(engine.clone()), StoreConfig::default());
        old.get().await.unwrap();

        let newer = manager(Arc::new(engine), StoreConfig::default().version(2));
        let err = newer.get().await.unwrap_err();
        assert_eq!(err, CoreError::blocked("test-store"));
    }

    #[tokio::test]
    async fn engine_error_becomes_open_error() {
        let engine = InMemoryEngine::new();
        let newer = manager(Arc::new(engine.clone()), StoreConfig::default().version(5));
        newer.get().await.unwrap().close();

        let older = manager(Arc::new(engine), StoreConfig::default().version(1));
        let err = older.get().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Open);
    }

    #[tokio::test]
    async fn existing_container_is_kept_on_upgrade() {
        let engine = InMemoryEngine::new();
        manager(Arc::new(engine.clone()), StoreConfig::default())
            .get()
            .await
            .unwrap()
            .close();

        let upgraded = manager(Arc::new(engine.clone()), StoreConfig::default().version(2));
        let conn = upgraded.get().await.unwrap();
        assert_eq!(conn.version(), 2);
        assert_eq!(conn.container_names(), vec![CONTAINER_NAME.to_string()]);
    }
}
