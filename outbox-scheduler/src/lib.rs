//! OutBox service layer.
//!
//! Ties the job store, delay queue, rate limiter and SMTP transport
//! into the scheduling + dispatch pipeline:
//! - [`Scheduler`]: enqueue single or bulk jobs, query status
//! - [`WorkerPool`]: bounded-concurrency consumer that dispatches
//!   ready entries end-to-end
//! - [`recovery`]: startup reconciliation between store and queue
//! - [`Clock`]: injectable time source ([`SystemClock`] in
//!   production, [`ManualClock`] in tests)
//! - [`OutboxConfig`]: the environment-driven configuration surface
//!
//! ## Startup order
//!
//! ```no_run
//! use outbox_mail::{SmtpConfig, SmtpTransport};
//! use outbox_queue::RedisDelayQueue;
//! use outbox_ratelimit::{HourlyLimiter, RedisCounterStore};
//! use outbox_scheduler::{OutboxConfig, Scheduler, SystemClock, WorkerPool, recovery};
//! use outbox_store::SqliteJobStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OutboxConfig::from_env();
//!
//! let store = Arc::new(SqliteJobStore::connect(&config.database_url).await?);
//! store.migrate().await?;
//! let queue = Arc::new(RedisDelayQueue::new(&config.redis_url, "emails").await?);
//! let limiter = HourlyLimiter::new(
//!     Arc::new(RedisCounterStore::new(&config.redis_url).await?),
//!     config.hourly_limits(),
//! );
//! let transport = Arc::new(SmtpTransport::new(SmtpConfig::from_env()).await?);
//! let clock = Arc::new(SystemClock);
//!
//! // Reconcile before consuming: stranded PROCESSING rows reset, lost
//! // queue entries re-created.
//! recovery::run(store.as_ref(), queue.as_ref(), clock.as_ref(), &config).await?;
//!
//! let mut pool = WorkerPool::new(
//!     store.clone(), queue.clone(), limiter.clone(), transport, clock.clone(), config.clone(),
//! );
//! pool.start()?;
//!
//! let scheduler = Scheduler::new(store, queue, limiter, clock, config);
//! # let _ = scheduler;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod recovery;
pub mod scheduler;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::OutboxConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{BulkReceipt, BulkScheduleRequest, ScheduleRequest, Scheduler};
pub use worker::{DispatchOutcome, WorkerPool};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::OutboxConfig;
    pub use crate::error::{SchedulerError, SchedulerResult};
    pub use crate::recovery;
    pub use crate::scheduler::{BulkReceipt, BulkScheduleRequest, ScheduleRequest, Scheduler};
    pub use crate::worker::{DispatchOutcome, WorkerPool};
}
