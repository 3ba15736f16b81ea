//! Error types for the service layer.

use thiserror::Error;

use outbox_queue::QueueError;
use outbox_ratelimit::RateLimitError;
use outbox_store::StoreError;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Service-layer errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Request rejected before any store write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Delay queue error
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Rate limiter error
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Worker pool already started
    #[error("Worker pool already running")]
    WorkerAlreadyRunning,

    /// Worker pool not started
    #[error("Worker pool not running")]
    WorkerNotRunning,
}
