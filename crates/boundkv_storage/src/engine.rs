//! Storage engine trait definitions.

use crate::error::StorageResult;
use crate::request::{Completion, OpenRequest, Request};
use std::fmt;
use std::sync::Arc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Lookups only.
    ReadOnly,
    /// Lookups, upserts and clears.
    ReadWrite,
}

impl TransactionMode {
    /// Returns true if the mode permits writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("readonly"),
            Self::ReadWrite => f.write_str("readwrite"),
        }
    }
}

/// The database layout as seen by an upgrade callback.
pub trait Schema {
    /// Returns the version being upgraded to.
    fn version(&self) -> u32;

    /// Returns the names of all containers, sorted.
    fn container_names(&self) -> Vec<String>;

    /// Returns true if the named container exists.
    fn has_container(&self, name: &str) -> bool;

    /// Creates an empty container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerExists` if a container with that name already exists.
    fn create_container(&mut self, name: &str) -> StorageResult<()>;
}

/// Callback run inside an open request when the database needs initialization
/// or an upgrade to a newer version.
pub type UpgradeFn = Box<dyn FnOnce(&mut dyn Schema) -> StorageResult<()> + Send>;

/// An asynchronous, signal-driven storage engine.
///
/// # Invariants
///
/// - `open` never blocks the caller; its outcome arrives on the returned request
/// - an open request resolves to exactly one [`crate::OpenEvent`]
/// - the upgrade callback runs at most once per request, before success is signalled
/// - a failed upgrade leaves the persisted database untouched
///
/// # Implementors
///
/// - [`super::InMemoryEngine`] - For testing and ephemeral stores
/// - [`super::FileEngine`] - For persistent stores
pub trait StorageEngine: Send + Sync {
    /// Issues an open request for the named database at `version`.
    ///
    /// If the database does not exist, or its stored version is lower than
    /// `version`, `upgrade` runs against the schema as part of the request.
    fn open(&self, name: &str, version: u32, upgrade: UpgradeFn) -> OpenRequest;
}

/// An open handle to one database.
pub trait EngineConnection: Send + Sync + fmt::Debug {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns the version the connection was opened at.
    fn version(&self) -> u32;

    /// Returns the names of all containers, sorted.
    fn container_names(&self) -> Vec<String>;

    /// Starts a transaction against one container.
    ///
    /// The transaction must be populated and committed without suspending;
    /// the caller owns it exclusively until [`EngineTransaction::commit`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the container does
    /// not exist.
    fn transaction(
        &self,
        container: &str,
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn EngineTransaction>>;

    /// Closes the connection and releases engine resources.
    ///
    /// Transactions committed before the close still complete.
    fn close(&self);

    /// Returns true once the connection has been closed.
    fn is_closed(&self) -> bool;
}

/// A transaction scoped to a single container.
///
/// Operations are enqueued synchronously and run in enqueue order when the
/// transaction is committed. The batch is atomic: either every operation is
/// applied or none is. Dropping a transaction without committing aborts it.
pub trait EngineTransaction: Send {
    /// Returns the transaction mode.
    fn mode(&self) -> TransactionMode;

    /// Enqueues a lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the operation.
    fn get(&mut self, key: &str) -> StorageResult<Request<Option<String>>>;

    /// Enqueues an upsert of `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on a read-only transaction.
    fn put(&mut self, key: &str, value: &str) -> StorageResult<Request<()>>;

    /// Enqueues removal of every entry in the container.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` on a read-only transaction.
    fn clear(&mut self) -> StorageResult<Request<()>>;

    /// Returns the number of enqueued operations.
    fn len(&self) -> usize;

    /// Returns true if nothing has been enqueued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands the enqueued operations to the engine.
    ///
    /// The returned completion resolves once the engine has applied the
    /// batch, or reports why it could not.
    fn commit(self: Box<Self>) -> Completion;
}

/// Shared handle to an open connection.
pub type ConnectionRef = Arc<dyn EngineConnection>;

/// Boxes an upgrade callback.
///
/// ```rust
/// use boundkv_storage::{upgrade, UpgradeFn};
///
/// let create_state: UpgradeFn = upgrade(|schema| schema.create_container("state"));
/// # drop(create_state);
/// ```
pub fn upgrade<F>(f: F) -> UpgradeFn
where
    F: FnOnce(&mut dyn Schema) -> StorageResult<()> + Send + 'static,
{
    Box::new(f)
}
