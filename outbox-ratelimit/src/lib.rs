//! Hourly send caps for OutBox.
//!
//! Two counter families guard outbound volume: one per sender and one
//! global, both over **fixed wall-clock hourly windows**
//! (`⌊now_ms / 3_600_000⌋`). Fixed windows are intentional: the time
//! until the next window is trivially computable for retry hints, and
//! the worst case is bounded at two full windows back-to-back across a
//! boundary.
//!
//! Checking and consuming are split on purpose:
//! [`HourlyLimiter::check`] is read-only, and
//! [`HourlyLimiter::increment`] runs only after a successful send, so
//! the counters reflect actual outbound mail rather than attempts. The
//! check→send→increment sequence is not atomic; under full parallelism
//! the effective cap can be exceeded by up to `concurrency − 1` per
//! window, an accepted trade-off.
//!
//! ## Quick Start
//!
//! ```
//! use outbox_ratelimit::{HourlyLimiter, HourlyLimits, MemoryCounterStore};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example() -> outbox_ratelimit::RateLimitResult<()> {
//! let limiter = HourlyLimiter::new(
//!     Arc::new(MemoryCounterStore::new()),
//!     HourlyLimits::default(),
//! );
//!
//! let sender = Uuid::new_v4();
//! let now = chrono::Utc::now();
//!
//! let decision = limiter.check(sender, now).await?;
//! assert!(decision.allowed);
//!
//! // ... send the email ...
//! limiter.increment(sender, now).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod limiter;
pub mod stores;

pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{
    HourlyLimiter, HourlyLimits, LimitScope, RateDecision, RateSnapshot, ms_until_next_hour,
    window_index,
};
pub use stores::{CounterStore, MemoryCounterStore, RedisCounterStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{RateLimitError, RateLimitResult};
    pub use crate::limiter::{HourlyLimiter, HourlyLimits, LimitScope, RateDecision, RateSnapshot};
    pub use crate::stores::{CounterStore, MemoryCounterStore, RedisCounterStore};
}
