//! Storage error types.

use thiserror::Error;

/// Errors from a key-value storage backend.
///
/// Callers in this crate treat a failed write as retryable: in-memory state
/// stays authoritative and the record is written again later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// I/O error (file system, database)
    #[error("I/O error: {0}")]
    Io(String),

    /// Failure injected by a test wrapper
    #[error("injected failure on {0}")]
    Injected(String),
}
