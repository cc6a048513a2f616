//! Storage error types.

use thiserror::Error;

/// Errors raised by [`crate::FleetStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Compare-and-set lost: the stored status moved since it was read
    #[error("Stale write on {entity} {id}: expected {expected}")]
    StaleWrite {
        entity: &'static str,
        id: String,
        expected: String,
    },

    /// A uniqueness rule (id or invariant index) rejected the write
    #[error("Uniqueness violation: {0}")]
    UniqueViolation(String),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A lock guarding in-memory state was poisoned by a panic
    #[error("Store lock poisoned")]
    Poisoned,

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite errors
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
