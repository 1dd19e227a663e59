//! # boundkv Core
//!
//! Timeout-guarded key-value store over an asynchronous storage engine.
//!
//! This crate provides:
//! - Deadline race: every wait on the engine settles within a budget
//! - Connection manager: one lazily opened connection, shared by all callers
//! - Transaction scopes: each operation runs in its own short transaction
//! - Key-value operations (`put`, `get`, `clear_all`) and the last-update pair
//!
//! ## Example
//!
//! ```rust,ignore
//! use boundkv_core::Store;
//!
//! let store = Store::in_memory();
//! store.mark_update().await?;
//! println!("{:?}", store.get_last_update().await?);
//! ```
//!
//! ## Failure model
//!
//! Every failure is returned as a [`CoreError`]; callers dispatch on
//! [`CoreError::kind`]. No operation is retried internally. Only a failed
//! open is forgotten, so the next operation opens the store again.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod deadline;
mod error;
mod scope;
mod stats;
mod store;

pub use boundkv_storage::{Request, TransactionMode};
pub use config::{
    StoreConfig, CONTAINER_NAME, DEFAULT_STORE_NAME, DEFAULT_TIMEOUT, LAST_UPDATE_KEY,
};
pub use connection::{Connection, ConnectionManager, OPEN_TIMEOUT_LABEL};
pub use deadline::race_with_deadline;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use scope::{OperationState, Scope};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{Store, StoreInfo, ACQUIRE_TIMEOUT_LABEL};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
