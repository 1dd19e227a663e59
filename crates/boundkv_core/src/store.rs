//! Store facade and key-value operations.

use crate::config::{StoreConfig, CONTAINER_NAME, LAST_UPDATE_KEY};
use crate::connection::{Connection, ConnectionManager};
use crate::deadline::race_with_deadline;
use crate::error::CoreResult;
use crate::scope::{run_in_scope, OperationState, OperationTracker, Scope};
use crate::stats::{StatsSnapshot, StoreStats};
use boundkv_storage::{FileEngine, InMemoryEngine, Request, StorageEngine, TransactionMode};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Label of the timeout raised when an operation outlives the acquire budget.
pub const ACQUIRE_TIMEOUT_LABEL: &str = "getting object store";

/// The key-value store handle.
///
/// `Store` owns one lazily opened connection to a single container and
/// exposes each key-value operation as its own transaction:
/// - the connection is opened on first use and shared by every operation
/// - every step that waits on the engine is bounded by a deadline
/// - failures come back as [`crate::CoreError`] values; nothing is retried
///
/// # Example
///
/// ```rust,ignore
/// use boundkv_core::Store;
///
/// let store = Store::in_memory();
/// let stamp = store.mark_update().await?;
/// assert_eq!(store.get_last_update().await?, Some(stamp));
/// ```
///
/// Operations may run concurrently; each uses its own transaction and no
/// ordering is imposed between them.
pub struct Store {
    config: StoreConfig,
    connections: ConnectionManager,
    stats: Arc<StoreStats>,
}

/// Description of an open store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Store name.
    pub name: String,
    /// Version the store is open at.
    pub version: u32,
    /// Container names, sorted.
    pub containers: Vec<String>,
    /// Whether the connection has been closed.
    pub closed: bool,
}

impl Store {
    /// Creates a store over `engine` with the default configuration.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::build(engine, StoreConfig::default())
    }

    /// Creates a store over `engine` with `config`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn with_config(engine: Arc<dyn StorageEngine>, config: StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self::build(engine, config))
    }

    /// Creates a store over a fresh in-memory engine.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryEngine::new()))
    }

    /// Creates a store whose data lives under the directory `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(FileEngine::new(path.as_ref())))
    }

    fn build(engine: Arc<dyn StorageEngine>, config: StoreConfig) -> Self {
        let stats = Arc::new(StoreStats::new());
        let connections = ConnectionManager::new(engine, &config, Arc::clone(&stats));
        Self {
            config,
            connections,
            stats,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the shared connection, opening the store on first use.
    ///
    /// # Errors
    ///
    /// Returns `Blocked`, `Open` or `Timeout`. A failed attempt is not
    /// cached; the next call tries again.
    pub async fn connection(&self) -> CoreResult<Connection> {
        race_with_deadline(
            self.connections.get(),
            ACQUIRE_TIMEOUT_LABEL,
            self.config.acquire_timeout,
        )
        .await
    }

    /// Runs `body` in its own transaction.
    ///
    /// `body` runs synchronously against a fresh transaction, which is then
    /// committed; the value of the slot `body` returns is produced once the
    /// transaction completes, or `Timeout` carrying `label` after `timeout`.
    /// The acquire budget bounds the whole call: obtaining the connection
    /// and waiting for the transaction together.
    ///
    /// ```rust,ignore
    /// let previous = store
    ///     .transact(TransactionMode::ReadWrite, "swap", DEFAULT_TIMEOUT, |scope| {
    ///         let old = scope.get("k")?;
    ///         scope.put("k", "new")?;
    ///         Ok(old)
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Blocked`, `Open` or `Timeout` from acquisition, and
    /// `Transaction` or `Timeout` from the transaction itself. When the
    /// acquire budget runs out first, the timeout carries
    /// [`ACQUIRE_TIMEOUT_LABEL`].
    pub async fn transact<T, F>(
        &self,
        mode: TransactionMode,
        label: &str,
        timeout: Duration,
        body: F,
    ) -> CoreResult<T>
    where
        F: FnOnce(&mut Scope<'_>) -> CoreResult<Request<T>>,
    {
        let mut tracker = OperationTracker::new(label);
        tracker.advance(OperationState::ConnectionPending);

        let mut connected = false;
        let operation = async {
            let connection = self.connections.get().await?;
            connected = true;
            run_in_scope(
                &connection,
                mode,
                label,
                timeout,
                &self.stats,
                &mut tracker,
                body,
            )
            .await
        };
        let outcome =
            race_with_deadline(operation, ACQUIRE_TIMEOUT_LABEL, self.config.acquire_timeout).await;

        tracker.finish(&outcome);
        if connected {
            self.stats.record_outcome(&outcome);
        }
        outcome
    }

    /// Stores `value` at `key`.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn put(&self, key: &str, value: &str) -> CoreResult<()> {
        self.put_within(key, value, self.config.operation_timeout).await
    }

    /// Stores `value` at `key`, waiting at most `timeout` for completion.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn put_within(&self, key: &str, value: &str, timeout: Duration) -> CoreResult<()> {
        let label = format!("setting key [{key}]");
        self.transact(TransactionMode::ReadWrite, &label, timeout, |scope| {
            scope.put(key, value)
        })
        .await
    }

    /// Returns the value at `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        self.get_within(key, self.config.operation_timeout).await
    }

    /// Returns the value at `key`, waiting at most `timeout` for completion.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn get_within(&self, key: &str, timeout: Duration) -> CoreResult<Option<String>> {
        let label = format!("getting key [{key}]");
        self.transact(TransactionMode::ReadOnly, &label, timeout, |scope| {
            scope.get(key)
        })
        .await
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn clear_all(&self) -> CoreResult<()> {
        self.clear_within(self.config.operation_timeout).await
    }

    /// Removes every entry, waiting at most `timeout` for completion.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn clear_within(&self, timeout: Duration) -> CoreResult<()> {
        self.clear_labelled("clearing store", timeout).await
    }

    /// Removes every entry; same as [`Store::clear_all`].
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn purge(&self) -> CoreResult<()> {
        self.clear_labelled("purging data", self.config.operation_timeout)
            .await
    }

    async fn clear_labelled(&self, label: &str, timeout: Duration) -> CoreResult<()> {
        self.transact(TransactionMode::ReadWrite, label, timeout, |scope| {
            scope.clear()
        })
        .await
    }

    /// Records the current wall-clock time under the last-update key.
    ///
    /// Returns the stored value: milliseconds since the Unix epoch in
    /// decimal.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn mark_update(&self) -> CoreResult<String> {
        self.mark_update_at(SystemTime::now()).await
    }

    /// Records `time` under the last-update key.
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn mark_update_at(&self, time: SystemTime) -> CoreResult<String> {
        let stamp = epoch_millis(time).to_string();
        self.put(LAST_UPDATE_KEY, &stamp).await?;
        Ok(stamp)
    }

    /// Returns the value stored by the latest [`Store::mark_update`].
    ///
    /// # Errors
    ///
    /// See [`Store::transact`].
    pub async fn get_last_update(&self) -> CoreResult<Option<String>> {
        self.get(LAST_UPDATE_KEY).await
    }

    /// Describes the open store, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error if the store cannot be opened.
    pub async fn inspect(&self) -> CoreResult<StoreInfo> {
        let connection = self.connection().await?;
        Ok(StoreInfo {
            name: connection.name().to_string(),
            version: connection.version(),
            containers: connection.container_names(),
            closed: connection.is_closed(),
        })
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true once the store's connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connections
            .cached()
            .is_some_and(|connection| !connection.is_closed())
    }

    /// Closes the connection and releases the engine's resources.
    ///
    /// Operations started afterwards fail; the store is not reopened.
    pub fn close(&self) {
        self.connections.close();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("store_name", &self.config.store_name)
            .field("container", &CONTAINER_NAME)
            .field("connections", &self.connections)
            .finish()
    }
}

fn epoch_millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
