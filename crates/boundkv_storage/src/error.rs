//! Error types for storage engine operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur inside a storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted database could not be decoded.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,

    /// The engine dropped a request without signalling an outcome.
    #[error("request aborted by the engine")]
    Aborted,

    /// A write was enqueued on a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The named container does not exist.
    #[error("container not found: {name}")]
    ContainerNotFound {
        /// Name of the container.
        name: String,
    },

    /// The named container already exists.
    #[error("container already exists: {name}")]
    ContainerExists {
        /// Name of the container.
        name: String,
    },

    /// The requested version is lower than the stored version.
    #[error("version mismatch: requested {requested}, stored {stored}")]
    VersionMismatch {
        /// Version passed to `open`.
        requested: u32,
        /// Version currently persisted.
        stored: u32,
    },

    /// The database name cannot be used by this engine.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),

    /// Version zero is reserved for "never initialized".
    #[error("invalid version: {0}")]
    InvalidVersion(u32),

    /// The upgrade callback failed.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// The engine rejected the transaction.
    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl StorageError {
    /// Creates a container-not-found error.
    pub fn container_not_found(name: impl Into<String>) -> Self {
        Self::ContainerNotFound { name: name.into() }
    }

    /// Creates a container-exists error.
    pub fn container_exists(name: impl Into<String>) -> Self {
        Self::ContainerExists { name: name.into() }
    }
}
