//! # boundkv Testkit
//!
//! Test utilities for boundkv.
//!
//! This crate provides:
//! - [`ScriptedEngine`], an engine that blocks, fails, stalls or delays on demand
//! - Test fixtures and store helpers
//! - Property-based test generators using proptest
//! - Model-checked operation sequences for fuzzing
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boundkv_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn stalled_commit_times_out() {
//!     let engine = ScriptedEngine::new();
//!     engine.push_commit(CommitBehavior::Stall);
//!     let store = TestStore::scripted(&engine);
//!     assert!(store.put("k", "v").await.unwrap_err().is_timeout());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod scripted;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use scripted::*;
pub use stress::*;
