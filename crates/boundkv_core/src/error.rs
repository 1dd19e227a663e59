//! Error types for boundkv core.

use boundkv_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in store operations.
///
/// Every variant is a normal, expected outcome of a bounded operation.
/// Callers dispatch on [`CoreError::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A guarded step did not settle before its deadline.
    #[error("timeout: {label}")]
    Timeout {
        /// Label of the step that timed out.
        label: String,
    },

    /// The engine failed to open or upgrade the store.
    #[error("open failed: {message}")]
    Open {
        /// Engine-reported reason.
        message: String,
    },

    /// The open was blocked by another connection to the store.
    #[error("open blocked: store {store:?} is held by another connection")]
    Blocked {
        /// Name of the store.
        store: String,
    },

    /// The engine reported a transaction failure.
    #[error("transaction failed: {message}")]
    Transaction {
        /// Engine-reported reason.
        message: String,
    },

    /// The store configuration is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Tag of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`CoreError::Timeout`].
    Timeout,
    /// See [`CoreError::Open`].
    Open,
    /// See [`CoreError::Blocked`].
    Blocked,
    /// See [`CoreError::Transaction`].
    Transaction,
    /// See [`CoreError::Config`].
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Open => "open",
            Self::Blocked => "blocked",
            Self::Transaction => "transaction",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

impl CoreError {
    /// Creates a timeout error.
    pub fn timeout(label: impl Into<String>) -> Self {
        Self::Timeout {
            label: label.into(),
        }
    }

    /// Creates an open error.
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /// Creates a blocked error.
    pub fn blocked(store: impl Into<String>) -> Self {
        Self::Blocked {
            store: store.into(),
        }
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wraps an engine error raised while opening the store.
    pub(crate) fn from_open(err: &StorageError) -> Self {
        Self::open(err.to_string())
    }

    /// Wraps an engine error raised by a transaction.
    pub(crate) fn from_transaction(err: &StorageError) -> Self {
        Self::transaction(err.to_string())
    }

    /// Returns the error's tag.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Open { .. } => ErrorKind::Open,
            Self::Blocked { .. } => ErrorKind::Blocked,
            Self::Transaction { .. } => ErrorKind::Transaction,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Returns true for [`CoreError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(CoreError::timeout("x").kind(), ErrorKind::Timeout);
        assert_eq!(CoreError::open("x").kind(), ErrorKind::Open);
        assert_eq!(CoreError::blocked("x").kind(), ErrorKind::Blocked);
        assert_eq!(CoreError::transaction("x").kind(), ErrorKind::Transaction);
        assert_eq!(CoreError::config("x").kind(), ErrorKind::Config);
    }

    #[test]
    fn messages_carry_context() {
        let err = CoreError::timeout("setting key [last-update]");
        assert_eq!(err.to_string(), "timeout: setting key [last-update]");
        assert!(err.is_timeout());

        let err = CoreError::from_transaction(&StorageError::ReadOnly);
        assert_eq!(err.to_string(), "transaction failed: transaction is read-only");
    }
}
