//! Error types for store operations.

use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-specific errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// A persisted row contains a status the code does not know
    #[error("Invalid status in store: {0}")]
    InvalidStatus(String),

    /// A persisted row contains an id that is not a UUID
    #[error("Invalid id in store: {0}")]
    InvalidId(String),
}
