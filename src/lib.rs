// OutBox - durable email job scheduling for Rust
//
// This crate is a facade over the workspace members: the durable job
// store, the delayed dispatch queue, the hourly rate limiter, the SMTP
// transport boundary, and the scheduler/worker service layer.

// Re-export the job store (models + SQLite implementation)
pub use outbox_store;

// Re-export the delay queue (Redis and in-memory backends)
pub use outbox_queue;

// Re-export the hourly rate limiter
pub use outbox_ratelimit;

// Re-export the SMTP transport boundary
pub use outbox_mail;

// Re-export the scheduler API, worker pool, recovery, clock and config
pub use outbox_scheduler;

/// Commonly used types from every member crate.
pub mod prelude {
    pub use outbox_mail::prelude::*;
    pub use outbox_queue::prelude::*;
    pub use outbox_ratelimit::prelude::*;
    pub use outbox_scheduler::prelude::*;
    pub use outbox_store::prelude::*;
}
