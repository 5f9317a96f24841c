//! Error types for entitlement stores.

use thiserror::Error;

/// Entitlement store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the store lock.
    #[error("entitlement store lock poisoned")]
    Lock,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
