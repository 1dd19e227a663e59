//! Test fixtures and store helpers.
//!
//! Provides convenience constructors for stores over each engine, with
//! short budgets so that timeout scenarios finish quickly.

use crate::scripted::ScriptedEngine;
use boundkv_core::{Store, StoreConfig};
use boundkv_storage::{FileEngine, InMemoryEngine, StorageEngine};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Budget used by [`test_config`].
pub const TEST_TIMEOUT: Duration = Duration::from_millis(250);

/// Default configuration with every budget set to [`TEST_TIMEOUT`].
pub fn test_config() -> StoreConfig {
    StoreConfig::default().timeouts(TEST_TIMEOUT)
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store over a fresh in-memory engine.
    pub fn memory() -> Self {
        Self::over(Arc::new(InMemoryEngine::new()), test_config())
    }

    /// Creates a store over a file engine in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let engine = FileEngine::new(temp_dir.path());
        let store = Store::with_config(Arc::new(engine), test_config())
            .expect("Test configuration should be valid");
        Self {
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates a store over `engine`; the engine keeps its script and data.
    pub fn scripted(engine: &ScriptedEngine) -> Self {
        Self::scripted_with(engine, test_config())
    }

    /// Creates a store over `engine` with `config`.
    pub fn scripted_with(engine: &ScriptedEngine, config: StoreConfig) -> Self {
        Self::over(Arc::new(engine.clone()), config)
    }

    fn over(engine: Arc<dyn StorageEngine>, config: StoreConfig) -> Self {
        Self {
            store: Store::with_config(engine, config).expect("Test configuration should be valid"),
            _temp_dir: None,
        }
    }

    /// Returns the data directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding `count` entries `key-{i}` -> `value-{i}`.
    pub async fn populated_store(count: usize) -> TestStore {
        let store = TestStore::memory();
        for i in 0..count {
            store
                .put(&format!("key-{i}"), &format!("value-{i}"))
                .await
                .expect("Failed to populate store");
        }
        store
    }

    /// Creates a store whose connection is already open.
    pub async fn opened_store(engine: &ScriptedEngine) -> TestStore {
        let store = TestStore::scripted(engine);
        store.connection().await.expect("Failed to open store");
        store
    }
}
