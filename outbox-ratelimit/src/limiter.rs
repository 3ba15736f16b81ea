//! The hourly limiter.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::RateLimitResult;
use crate::stores::CounterStore;

const HOUR_MS: i64 = 3_600_000;

/// Counters expire after two full hours without activity: long enough
/// for the current window plus the boundary overlap, short enough that
/// idle senders cost nothing.
pub(crate) const COUNTER_TTL: Duration = Duration::from_secs(2 * 3600);

/// Buffer added to retry hints so a deferred job does not fire exactly
/// on the window boundary and race the rollover.
const BOUNDARY_BUFFER_MS: i64 = 1000;

/// Index of the fixed hourly window containing `now`.
pub fn window_index(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().div_euclid(HOUR_MS)
}

/// Milliseconds from `now` until the next hourly window opens.
pub fn ms_until_next_hour(now: DateTime<Utc>) -> i64 {
    let now_ms = now.timestamp_millis();
    (window_index(now) + 1) * HOUR_MS - now_ms
}

/// The caps enforced per hourly window.
#[derive(Debug, Clone, Copy)]
pub struct HourlyLimits {
    /// Sends allowed per sender per window.
    pub per_sender: u64,
    /// Sends allowed across all senders per window.
    pub global: u64,
}

impl Default for HourlyLimits {
    fn default() -> Self {
        Self {
            per_sender: 50,
            global: 200,
        }
    }
}

impl HourlyLimits {
    /// Set the per-sender cap.
    pub fn with_per_sender(mut self, cap: u64) -> Self {
        self.per_sender = cap;
        self
    }

    /// Set the global cap.
    pub fn with_global(mut self, cap: u64) -> Self {
        self.global = cap;
        self
    }
}

/// Which cap a denial came from. When both are exhausted the
/// per-sender cap is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Sender,
    Global,
}

/// Result of a read-only limit check.
#[derive(Debug, Clone)]
pub struct RateDecision {
    /// Whether a send may proceed.
    pub allowed: bool,
    /// The cap that denied, when not allowed.
    pub scope: Option<LimitScope>,
    /// Count in the offending scope (the sender scope when allowed).
    pub current_count: u64,
    /// Cap in the offending scope (the sender scope when allowed).
    pub limit: u64,
    /// How long a denied caller should wait before re-trying.
    pub retry_after_ms: Option<i64>,
}

/// Read-only counter snapshot for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSnapshot {
    pub sender_count: u64,
    pub sender_limit: u64,
    pub global_count: u64,
    pub global_limit: u64,
}

/// Hourly fixed-window limiter over a counter store.
#[derive(Clone)]
pub struct HourlyLimiter {
    store: Arc<dyn CounterStore>,
    limits: HourlyLimits,
}

impl HourlyLimiter {
    /// Create a limiter over the given store.
    pub fn new(store: Arc<dyn CounterStore>, limits: HourlyLimits) -> Self {
        Self { store, limits }
    }

    /// The configured caps.
    pub fn limits(&self) -> HourlyLimits {
        self.limits
    }

    fn sender_key(user_id: Uuid, window: i64) -> String {
        format!("sender:{user_id}:{window}")
    }

    fn global_key(window: i64) -> String {
        format!("global:{window}")
    }

    /// Read-only check of both caps for the window containing `now`.
    ///
    /// Consumes nothing: callers that go on to send must call
    /// [`increment`](Self::increment) afterwards.
    pub async fn check(&self, user_id: Uuid, now: DateTime<Utc>) -> RateLimitResult<RateDecision> {
        let window = window_index(now);
        let (sender_count, global_count) = self
            .store
            .read_pair(
                &Self::sender_key(user_id, window),
                &Self::global_key(window),
            )
            .await?;

        // Per-sender cap first; when both are exhausted, the sender
        // cap is the one reported.
        if sender_count >= self.limits.per_sender {
            let retry_after = ms_until_next_hour(now) + BOUNDARY_BUFFER_MS;
            debug!(
                user_id = %user_id,
                count = sender_count,
                limit = self.limits.per_sender,
                retry_after_ms = retry_after,
                "Sender cap reached"
            );
            return Ok(RateDecision {
                allowed: false,
                scope: Some(LimitScope::Sender),
                current_count: sender_count,
                limit: self.limits.per_sender,
                retry_after_ms: Some(retry_after),
            });
        }

        if global_count >= self.limits.global {
            let retry_after = ms_until_next_hour(now) + BOUNDARY_BUFFER_MS;
            debug!(
                count = global_count,
                limit = self.limits.global,
                retry_after_ms = retry_after,
                "Global cap reached"
            );
            return Ok(RateDecision {
                allowed: false,
                scope: Some(LimitScope::Global),
                current_count: global_count,
                limit: self.limits.global,
                retry_after_ms: Some(retry_after),
            });
        }

        trace!(user_id = %user_id, sender_count, global_count, "Rate check passed");
        Ok(RateDecision {
            allowed: true,
            scope: None,
            current_count: sender_count,
            limit: self.limits.per_sender,
            retry_after_ms: None,
        })
    }

    /// Consume one send from both counters and refresh their TTL.
    /// Call only after a successful send.
    pub async fn increment(&self, user_id: Uuid, now: DateTime<Utc>) -> RateLimitResult<()> {
        let window = window_index(now);
        self.store
            .increment_pair(
                &Self::sender_key(user_id, window),
                &Self::global_key(window),
                COUNTER_TTL,
            )
            .await?;

        trace!(user_id = %user_id, window = window, "Counters incremented");
        Ok(())
    }

    /// Counter snapshot for the window containing `now`.
    pub async fn status(&self, user_id: Uuid, now: DateTime<Utc>) -> RateLimitResult<RateSnapshot> {
        let window = window_index(now);
        let (sender_count, global_count) = self
            .store
            .read_pair(
                &Self::sender_key(user_id, window),
                &Self::global_key(window),
            )
            .await?;

        Ok(RateSnapshot {
            sender_count,
            sender_limit: self.limits.per_sender,
            global_count,
            global_limit: self.limits.global,
        })
    }
}
