//! Delay queue for OutBox dispatch.
//!
//! A durable queue of not-yet-ready jobs, ordered by ready-at time:
//! - entries become visible to consumers only once `ready_at` passes
//! - claiming is atomic, so each entry is processed by one consumer
//! - failed entries retry with exponential backoff up to a bounded
//!   attempt count, then land in a dead set retained for inspection
//! - completed entries are removed
//!
//! Two backends implement the [`DelayQueue`] trait: [`RedisDelayQueue`]
//! (a sorted set scored by ready-at milliseconds, durable across
//! process and broker restarts) and [`MemoryDelayQueue`] (in-process,
//! for tests and single-process deployments).
//!
//! The queue carries job ids only; the job store remains the source of
//! truth. Consumers are expected to re-read the store before acting on
//! an entry.
//!
//! ## Quick Start
//!
//! ```no_run
//! use outbox_queue::{DelayQueue, JobPayload, RedisDelayQueue};
//! use uuid::Uuid;
//!
//! # async fn example() -> outbox_queue::QueueResult<()> {
//! let queue = RedisDelayQueue::new("redis://localhost:6379", "emails").await?;
//!
//! let job_id = Uuid::new_v4();
//! queue
//!     .enqueue(&job_id.to_string(), JobPayload { email_job_id: job_id }, 5_000, 3)
//!     .await?;
//!
//! if let Some(entry) = queue.dequeue().await? {
//!     // ... dispatch ...
//!     queue.mark_completed(&entry).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod error;
pub mod memory;
pub mod queue;

pub use entry::{JobPayload, QueueEntry};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryDelayQueue;
pub use queue::{DelayQueue, FailureOutcome, QueueConfig, RedisDelayQueue};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::entry::{JobPayload, QueueEntry};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::memory::MemoryDelayQueue;
    pub use crate::queue::{DelayQueue, FailureOutcome, QueueConfig, RedisDelayQueue};
}
