//! # boundkv Storage
//!
//! Storage engine traits and implementations for boundkv.
//!
//! This crate provides the lowest-level storage abstraction: an engine that
//! opens named databases, hands out transactions scoped to one container,
//! and reports every outcome asynchronously.
//!
//! ## Design Principles
//!
//! - Engines signal outcomes; they never block the caller
//! - An open request ends in exactly one of success, blocked or error
//! - Transactions are populated synchronously and committed as one batch
//! - Engines know nothing about deadlines; callers impose them
//!
//! ## Available Engines
//!
//! - [`InMemoryEngine`] - For testing and ephemeral stores
//! - [`FileEngine`] - For persistent stores using OS file APIs
//!
//! ## Example
//!
//! ```rust,ignore
//! use boundkv_storage::{upgrade, InMemoryEngine, OpenEvent, StorageEngine, TransactionMode};
//!
//! let engine = InMemoryEngine::new();
//! let OpenEvent::Success(conn) = engine
//!     .open("test-store", 1, upgrade(|schema| schema.create_container("state")))
//!     .await
//! else {
//!     panic!("open failed");
//! };
//!
//! let mut txn = conn.transaction("state", TransactionMode::ReadWrite)?;
//! txn.put("last-update", "1700000000000")?;
//! txn.commit().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod engine;
mod error;
mod file;
mod image;
mod memory;
mod request;

pub use engine::{
    upgrade, ConnectionRef, EngineConnection, EngineTransaction, Schema, StorageEngine,
    TransactionMode, UpgradeFn,
};
pub use error::{StorageError, StorageResult};
pub use file::FileEngine;
pub use image::{DatabaseImage, Entries, IMAGE_FORMAT};
pub use memory::InMemoryEngine;
pub use request::{
    Completion, CompletionSignal, OpenEvent, OpenRequest, OpenResponder, Request,
};
