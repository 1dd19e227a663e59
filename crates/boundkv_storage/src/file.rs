//! File-based storage engine for persistent stores.
//!
//! Each database lives in the engine's root directory:
//!
//! ```text
//! <root>/
//! ├─ <name>.kvdb       # CBOR snapshot (version, containers, entries)
//! ├─ <name>.kvdb.tmp   # Temporary file for atomic snapshot writes
//! └─ <name>.lock       # Advisory lock held by every open connection
//! ```
//!
//! Every connection holds a shared lock on the LOCK file. Upgrading a
//! database to a newer version needs the exclusive lock, so an upgrade
//! attempted while another connection is open reports `Blocked`.

use crate::batch::{Batch, BatchSink, BatchTransaction};
use crate::engine::{
    EngineConnection, EngineTransaction, Schema, StorageEngine, TransactionMode, UpgradeFn,
};
use crate::error::{StorageError, StorageResult};
use crate::image::DatabaseImage;
use crate::request::{CompletionSignal, OpenRequest, OpenResponder};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DB_EXTENSION: &str = "kvdb";
const TEMP_EXTENSION: &str = "kvdb.tmp";
const LOCK_EXTENSION: &str = "lock";

/// A file-based storage engine.
///
/// Opens and commits perform their disk I/O on tokio's blocking pool and
/// signal their outcome when it finishes, so the caller never blocks on the
/// file system. Read-only transactions are served from the cached snapshot.
///
/// # Durability
///
/// A committed write transaction is durable once its completion resolves:
/// the snapshot is written to a temporary file, synced and renamed over the
/// previous one.
///
/// # Example
///
/// ```rust,ignore
/// use boundkv_storage::{upgrade, FileEngine, OpenEvent, StorageEngine};
///
/// let engine = FileEngine::new("data");
/// let request = engine.open("test-store", 1, upgrade(|schema| schema.create_container("state")));
/// assert!(matches!(request.await, OpenEvent::Success(_)));
/// ```
#[derive(Debug, Clone)]
pub struct FileEngine {
    root: PathBuf,
    databases: Arc<Mutex<HashMap<String, Arc<FileDatabase>>>>,
}

impl FileEngine {
    /// Creates an engine storing databases under `root`.
    ///
    /// The directory is created on the first open.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            databases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the snapshot path of a database.
    #[must_use]
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{DB_EXTENSION}"))
    }

    /// Returns the lock file path of a database.
    #[must_use]
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{LOCK_EXTENSION}"))
    }

    fn respond(&self, name: &str, version: u32, upgrade: UpgradeFn, responder: OpenResponder) {
        if responder.is_abandoned() {
            tracing::debug!(db = name, "open abandoned before it started");
            return;
        }
        match self.try_open(name, version, upgrade) {
            Ok(Some(conn)) => {
                if let Err(conn) = responder.succeed(conn) {
                    tracing::debug!(db = name, "open finished after requester left, closing");
                    conn.close();
                }
            }
            Ok(None) => {
                tracing::debug!(db = name, version, "open blocked by another connection");
                responder.block();
            }
            Err(err) => responder.fail(err),
        }
    }

    /// Opens a database. `Ok(None)` means the open is blocked.
    fn try_open(
        &self,
        name: &str,
        version: u32,
        upgrade: UpgradeFn,
    ) -> StorageResult<Option<Arc<FileConnection>>> {
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }
        validate_name(name)?;
        fs::create_dir_all(&self.root)?;

        let db = self.database(name)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path(name))?;

        {
            let _writer = db.write_lock.lock();
            let mut image = db.image.write();
            if image.version > version {
                return Err(StorageError::VersionMismatch {
                    requested: version,
                    stored: image.version,
                });
            }

            if image.version < version {
                if FileExt::try_lock_exclusive(&lock_file).is_err() {
                    return Ok(None);
                }
                let mut staged = image.clone();
                staged.version = version;
                let result = upgrade(&mut staged).and_then(|()| db.persist(&staged));
                FileExt::unlock(&lock_file)?;
                result?;
                tracing::info!(db = name, version, "database upgraded");
                *image = staged;
            }
        }

        if FileExt::try_lock_shared(&lock_file).is_err() {
            return Ok(None);
        }

        Ok(Some(Arc::new(FileConnection {
            name: name.to_string(),
            version,
            db,
            lock: Mutex::new(Some(lock_file)),
            closed: AtomicBool::new(false),
        })))
    }

    fn database(&self, name: &str) -> StorageResult<Arc<FileDatabase>> {
        let mut databases = self.databases.lock();
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }

        let path = self.database_path(name);
        let image = read_image(&path)?;
        let db = Arc::new(FileDatabase {
            temp_path: self.root.join(format!("{name}.{TEMP_EXTENSION}")),
            path,
            image: RwLock::new(image),
            write_lock: Mutex::new(()),
        });
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }
}

impl StorageEngine for FileEngine {
    fn open(&self, name: &str, version: u32, upgrade: UpgradeFn) -> OpenRequest {
        let (responder, request) = OpenRequest::channel();
        let engine = self.clone();
        let name = name.to_string();
        run_blocking(move || engine.respond(&name, version, upgrade, responder));
        request
    }
}

/// Runs `f` on tokio's blocking pool, or inline outside a runtime.
fn run_blocking<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(f);
        }
        Err(_) => f(),
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

fn read_image(path: &Path) -> StorageResult<DatabaseImage> {
    match fs::read(path) {
        Ok(bytes) => DatabaseImage::decode(&bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(DatabaseImage::new()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug)]
struct FileDatabase {
    path: PathBuf,
    temp_path: PathBuf,
    image: RwLock<DatabaseImage>,
    /// Serializes snapshot writes.
    write_lock: Mutex<()>,
}

impl FileDatabase {
    fn persist(&self, image: &DatabaseImage) -> StorageResult<()> {
        let bytes = image.encode()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.temp_path, &self.path)?;
        Ok(())
    }

    fn commit(&self, batch: &Batch) -> StorageResult<()> {
        let _writer = self.write_lock.lock();
        let mut staged = self.image.read().clone();
        batch.apply(staged.entries_mut(&batch.container)?);
        self.persist(&staged)?;
        *self.image.write() = staged;
        Ok(())
    }
}

impl BatchSink for FileDatabase {
    fn submit(self: Arc<Self>, batch: Batch, signal: CompletionSignal) {
        if !batch.is_mutating() {
            let image = self.image.read();
            match image.entries(&batch.container) {
                Ok(entries) => {
                    batch.apply_read_only(entries);
                    signal.complete();
                }
                Err(err) => signal.fail(err),
            }
            return;
        }

        run_blocking(move || match self.commit(&batch) {
            Ok(()) => signal.complete(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "commit failed");
                signal.fail(err);
            }
        });
    }
}

/// A connection to a file-backed database.
#[derive(Debug)]
struct FileConnection {
    name: String,
    version: u32,
    db: Arc<FileDatabase>,
    /// Lock file handle, held for shared access until close.
    lock: Mutex<Option<File>>,
    closed: AtomicBool,
}

impl EngineConnection for FileConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn container_names(&self) -> Vec<String> {
        self.db.image.read().container_names()
    }

    fn transaction(
        &self,
        container: &str,
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn EngineTransaction>> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        if !self.db.image.read().has_container(container) {
            return Err(StorageError::container_not_found(container));
        }
        Ok(Box::new(BatchTransaction::new(
            container,
            mode,
            self.db.clone(),
        )))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Dropping the handle releases the shared lock.
            self.lock.lock().take();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for FileConnection {
    fn drop(&mut self) {
        self.close();
    }
}
