//! Error types for driver and blob operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur at the driver boundary or in a blob provider.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No record exists for the requested id or key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record already exists for an id that may be written only once.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The driver rejected or could not run a command.
    #[error("driver error: {0}")]
    Driver(String),

    /// Stored data is inconsistent with what was expected.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The transaction has already been committed or rolled back.
    #[error("transaction is closed")]
    Closed,
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an already-exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Maps file-system errors onto the id-level variants.
    pub(crate) fn from_io_for(err: io::Error, what: impl Into<String>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(what.into()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(what.into()),
            _ => Self::Io(err),
        }
    }
}
