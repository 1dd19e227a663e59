//! CLI command implementations.

pub mod inspect;
pub mod kv;
pub mod run;

use boundkv_core::{CoreError, Store, StoreConfig};
use boundkv_storage::{FileEngine, InMemoryEngine, StorageEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A store operation failed.
    #[error("{kind} error: {source}")]
    Store {
        /// Tag of the failure.
        kind: boundkv_core::ErrorKind,
        /// The failure.
        #[source]
        source: CoreError,
    },

    /// Output could not be serialized.
    #[error("failed to format output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CoreError> for CliError {
    fn from(source: CoreError) -> Self {
        Self::Store {
            kind: source.kind(),
            source,
        }
    }
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Options shared by every command that touches the store.
#[derive(Debug, Clone)]
pub struct StoreArgs {
    /// Data directory; `None` selects the in-memory engine.
    pub path: Option<PathBuf>,
    /// Store name.
    pub name: String,
    /// Budget for each guarded step.
    pub timeout_ms: u64,
}

impl StoreArgs {
    /// Builds the store configuration.
    pub fn config(&self) -> StoreConfig {
        StoreConfig::default()
            .store_name(self.name.clone())
            .timeouts(Duration::from_millis(self.timeout_ms))
    }

    /// Opens a store handle over the selected engine.
    pub fn open(&self) -> CliResult<Store> {
        let engine: Arc<dyn StorageEngine> = match &self.path {
            Some(path) => Arc::new(FileEngine::new(path)),
            None => {
                tracing::debug!("no path given, using an in-memory store");
                Arc::new(InMemoryEngine::new())
            }
        };
        Ok(Store::with_config(engine, self.config())?)
    }
}

#[cfg(test)]
pub(crate) fn memory_args() -> StoreArgs {
    StoreArgs {
        path: None,
        name: "cli-test".to_string(),
        timeout_ms: 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_a_config_error() {
        let args = StoreArgs {
            timeout_ms: 0,
            ..memory_args()
        };
        let err = args.open().unwrap_err();
        assert!(err.to_string().starts_with("config error"));
    }

    #[tokio::test]
    async fn file_args_persist_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let args = StoreArgs {
            path: Some(dir.path().to_path_buf()),
            ..memory_args()
        };

        let store = args.open().unwrap();
        store.put("k", "v").await.unwrap();
        store.close();

        let reopened = args.open().unwrap();
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(dir.path().join("cli-test.kvdb").exists());
    }
}
