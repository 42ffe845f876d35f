//! Core error types

use thiserror::Error;

/// Errors raised by a storage backend or the transaction overlay
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite backend error
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes do not match the expected layout
    #[error("Corrupt record in {namespace}/{key}: {reason}")]
    Corrupt {
        /// Namespace of the bad record
        namespace: String,
        /// Key of the bad record
        key: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Result alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;
