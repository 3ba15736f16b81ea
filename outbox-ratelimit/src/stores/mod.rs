//! Counter store backends.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::RateLimitResult;

mod memory;
mod redis;

pub use self::memory::MemoryCounterStore;
pub use self::redis::RedisCounterStore;

/// Storage for the paired sender/global window counters.
///
/// `increment_pair` must apply both increments atomically so that the
/// two counter families never drift from one another.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current values of both counters. Missing or expired counters
    /// read as zero.
    async fn read_pair(&self, sender_key: &str, global_key: &str) -> RateLimitResult<(u64, u64)>;

    /// Increment both counters by one and refresh their expiry.
    async fn increment_pair(
        &self,
        sender_key: &str,
        global_key: &str,
        ttl: Duration,
    ) -> RateLimitResult<()>;

    /// Backend name, for logging.
    fn store_type(&self) -> &'static str;
}
