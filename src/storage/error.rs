//! Storage error types
//!
//! Defines all errors that can occur in the summary store.

use thiserror::Error;

/// Errors that can occur in the summary store
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed (creating the data directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite rejected a statement or could not be opened
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A batch could not be written; the transaction was rolled back
    #[error("Write failed for {source_name} ({period}): {message}")]
    Write {
        source_name: String,
        period: String,
        message: String,
    },

    /// A stored value could not be decoded
    #[error("Corrupt row: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
