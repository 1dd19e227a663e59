//! In-memory storage engine.

use crate::batch::{Batch, BatchSink, BatchTransaction};
use crate::engine::{
    EngineConnection, EngineTransaction, Schema, StorageEngine, TransactionMode, UpgradeFn,
};
use crate::error::{StorageError, StorageResult};
use crate::image::DatabaseImage;
use crate::request::{CompletionSignal, OpenRequest};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory storage engine.
///
/// This engine keeps every database in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Cloned handles share the same databases, so several stores opened on
/// one engine observe each other's writes and open connections.
///
/// # Example
///
/// ```rust,ignore
/// use boundkv_storage::{upgrade, InMemoryEngine, OpenEvent, StorageEngine};
///
/// let engine = InMemoryEngine::new();
/// let request = engine.open("test-store", 1, upgrade(|schema| schema.create_container("state")));
/// assert!(matches!(request.await, OpenEvent::Success(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    databases: Arc<Mutex<HashMap<String, Arc<MemoryDatabase>>>>,
}

impl InMemoryEngine {
    /// Creates a new engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of a database's current image.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn image(&self, name: &str) -> Option<DatabaseImage> {
        self.databases
            .lock()
            .get(name)
            .map(|db| db.image.read().clone())
    }

    /// Returns the number of open connections to a database.
    #[must_use]
    pub fn open_connections(&self, name: &str) -> usize {
        self.databases
            .lock()
            .get(name)
            .map_or(0, |db| db.open_connections.load(Ordering::SeqCst))
    }

    /// Removes a database.
    ///
    /// Connections that are still open keep their own handle to its data.
    pub fn delete(&self, name: &str) -> bool {
        self.databases.lock().remove(name).is_some()
    }

    fn database(&self, name: &str) -> Arc<MemoryDatabase> {
        Arc::clone(
            self.databases
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryDatabase::new())),
        )
    }
}

impl StorageEngine for InMemoryEngine {
    fn open(&self, name: &str, version: u32, upgrade: UpgradeFn) -> OpenRequest {
        let (responder, request) = OpenRequest::channel();
        if version == 0 {
            responder.fail(StorageError::InvalidVersion(version));
            return request;
        }

        let db = self.database(name);
        {
            let mut image = db.image.write();
            if image.version > version {
                responder.fail(StorageError::VersionMismatch {
                    requested: version,
                    stored: image.version,
                });
                return request;
            }

            if image.version < version {
                if db.open_connections.load(Ordering::SeqCst) > 0 {
                    tracing::debug!(db = name, version, "upgrade blocked by open connections");
                    responder.block();
                    return request;
                }

                let mut staged = image.clone();
                staged.version = version;
                if let Err(err) = upgrade(&mut staged) {
                    responder.fail(err);
                    return request;
                }
                *image = staged;
            }

            db.open_connections.fetch_add(1, Ordering::SeqCst);
        }

        let conn = Arc::new(MemoryConnection {
            name: name.to_string(),
            version,
            shared: Arc::new(Shared { db }),
            closed: AtomicBool::new(false),
        });
        if let Err(conn) = responder.succeed(conn) {
            conn.close();
        }
        request
    }
}

#[derive(Debug)]
struct MemoryDatabase {
    image: RwLock<DatabaseImage>,
    open_connections: AtomicUsize,
}

impl MemoryDatabase {
    fn new() -> Self {
        Self {
            image: RwLock::new(DatabaseImage::new()),
            open_connections: AtomicUsize::new(0),
        }
    }
}

#[derive(Debug)]
struct Shared {
    db: Arc<MemoryDatabase>,
}

impl BatchSink for Shared {
    fn submit(self: Arc<Self>, batch: Batch, signal: CompletionSignal) {
        if batch.is_mutating() {
            let mut image = self.db.image.write();
            match image.entries_mut(&batch.container) {
                Ok(entries) => {
                    batch.apply(entries);
                    signal.complete();
                }
                Err(err) => signal.fail(err),
            }
        } else {
            let image = self.db.image.read();
            match image.entries(&batch.container) {
                Ok(entries) => {
                    batch.apply_read_only(entries);
                    signal.complete();
                }
                Err(err) => signal.fail(err),
            }
        }
    }
}

/// A connection to an in-memory database.
#[derive(Debug)]
struct MemoryConnection {
    name: String,
    version: u32,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl EngineConnection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn container_names(&self) -> Vec<String> {
        self.shared.db.image.read().container_names()
    }

    fn transaction(
        &self,
        container: &str,
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn EngineTransaction>> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        if !self.shared.db.image.read().has_container(container) {
            return Err(StorageError::container_not_found(container));
        }
        Ok(Box::new(BatchTransaction::new(
            container,
            mode,
            self.shared.clone(),
        )))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.db.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}
