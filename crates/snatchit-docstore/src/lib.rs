//! Document store abstraction for the SnatchIt membership core.
//!
//! Backend crates (e.g., snatchit-store-memory, snatchit-store-sqlite) implement
//! the [`DocStore`] trait so the membership engine doesn't depend on any specific
//! database engine. The store offers per-document atomicity plus all-or-nothing
//! multi-document batches of commutative set operations; that batch atomicity is
//! the only consistency primitive the membership engine relies on.

use thiserror::Error;

mod store;
pub mod types;

pub use store::{DocStore, Document, FieldOp, FieldValue, WriteOp};
#[cfg(feature = "test-support")]
pub use store::MockDocStore;
pub use types::*;

/// Uniform error type for all document store backends.
#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// Transient failure; the caller may retry the identical batch.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Collection holding gang documents.
pub const GANGS: &str = "gangs";
/// Collection holding user documents.
pub const USERS: &str = "users";
