//! Configuration surface.

use std::str::FromStr;
use std::time::Duration;

use outbox_ratelimit::HourlyLimits;

/// Service configuration, loaded once at startup from `OUTBOX_*`
/// environment variables. Unrecognized variables are ignored;
/// unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Parallel dispatches.
    pub worker_concurrency: usize,

    /// Per-sender hourly send cap.
    pub max_emails_per_hour_per_sender: u64,

    /// Global hourly send cap.
    pub global_max_emails_per_hour: u64,

    /// Per-dispatch pacing sleep, taken inside the worker slot.
    pub min_delay_between_emails: Duration,

    /// Pool-wide safety throttle, dispatches per second.
    pub queue_rate_limit: u32,

    /// Transport attempts per queue entry before it goes dead.
    pub transport_retry_attempts: u32,

    /// Base delay for transport-failure backoff (doubles per attempt).
    pub transport_backoff_base: Duration,

    /// How long an idle worker waits before polling the queue again.
    pub worker_poll_interval: Duration,

    /// Job store location.
    pub database_url: String,

    /// Queue and rate-counter broker.
    pub redis_url: String,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 5,
            max_emails_per_hour_per_sender: 50,
            global_max_emails_per_hour: 200,
            min_delay_between_emails: Duration::from_millis(2000),
            queue_rate_limit: 100,
            transport_retry_attempts: 3,
            transport_backoff_base: Duration::from_millis(1000),
            worker_poll_interval: Duration::from_millis(250),
            database_url: "sqlite:outbox.db".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl OutboxConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse("OUTBOX_WORKER_CONCURRENCY") {
            config.worker_concurrency = n;
        }
        if let Some(n) = env_parse("OUTBOX_MAX_EMAILS_PER_HOUR_PER_SENDER") {
            config.max_emails_per_hour_per_sender = n;
        }
        if let Some(n) = env_parse("OUTBOX_GLOBAL_MAX_EMAILS_PER_HOUR") {
            config.global_max_emails_per_hour = n;
        }
        if let Some(ms) = env_parse::<u64>("OUTBOX_MIN_DELAY_BETWEEN_EMAILS_MS") {
            config.min_delay_between_emails = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse("OUTBOX_QUEUE_RATE_LIMIT") {
            config.queue_rate_limit = n;
        }
        if let Some(n) = env_parse("OUTBOX_TRANSPORT_RETRY_ATTEMPTS") {
            config.transport_retry_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("OUTBOX_TRANSPORT_BACKOFF_BASE_MS") {
            config.transport_backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("OUTBOX_WORKER_POLL_INTERVAL_MS") {
            config.worker_poll_interval = Duration::from_millis(ms);
        }
        if let Ok(url) = std::env::var("OUTBOX_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(url) = std::env::var("OUTBOX_REDIS_URL") {
            config.redis_url = url;
        }

        config
    }

    /// The hourly caps as limiter configuration.
    pub fn hourly_limits(&self) -> HourlyLimits {
        HourlyLimits::default()
            .with_per_sender(self.max_emails_per_hour_per_sender)
            .with_global(self.global_max_emails_per_hour)
    }

    /// Set the number of parallel dispatches.
    pub fn with_worker_concurrency(mut self, n: usize) -> Self {
        self.worker_concurrency = n;
        self
    }

    /// Set the per-dispatch pacing sleep.
    pub fn with_min_delay_between_emails(mut self, delay: Duration) -> Self {
        self.min_delay_between_emails = delay;
        self
    }

    /// Set the pool-wide dispatch throttle.
    pub fn with_queue_rate_limit(mut self, per_second: u32) -> Self {
        self.queue_rate_limit = per_second;
        self
    }

    /// Set the transport attempt budget.
    pub fn with_transport_retry_attempts(mut self, attempts: u32) -> Self {
        self.transport_retry_attempts = attempts;
        self
    }

    /// Set the transport backoff base delay.
    pub fn with_transport_backoff_base(mut self, base: Duration) -> Self {
        self.transport_backoff_base = base;
        self
    }

    /// Set the idle poll interval.
    pub fn with_worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults_match_product_config() {
        let config = OutboxConfig::default();

        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.max_emails_per_hour_per_sender, 50);
        assert_eq!(config.global_max_emails_per_hour, 200);
        assert_eq!(config.min_delay_between_emails, Duration::from_millis(2000));
        assert_eq!(config.queue_rate_limit, 100);
        assert_eq!(config.transport_retry_attempts, 3);
        assert_eq!(config.transport_backoff_base, Duration::from_millis(1000));
    }

    #[test]
    fn test_hourly_limits_projection() {
        let limits = OutboxConfig::default()
            .with_worker_concurrency(2)
            .hourly_limits();

        assert_eq!(limits.per_sender, 50);
        assert_eq!(limits.global, 200);
    }

    #[test]
    fn test_from_env_overrides_and_ignores_garbage() {
        unsafe {
            env::set_var("OUTBOX_WORKER_CONCURRENCY", "9");
            env::set_var("OUTBOX_QUEUE_RATE_LIMIT", "not-a-number");
        }

        let config = OutboxConfig::from_env();
        assert_eq!(config.worker_concurrency, 9);
        // Unparsable values keep the default.
        assert_eq!(config.queue_rate_limit, 100);

        unsafe {
            env::remove_var("OUTBOX_WORKER_CONCURRENCY");
            env::remove_var("OUTBOX_QUEUE_RATE_LIMIT");
        }
    }

    #[test]
    fn test_builder_overrides() {
        let config = OutboxConfig::default()
            .with_min_delay_between_emails(Duration::from_millis(5))
            .with_queue_rate_limit(1000);

        assert_eq!(config.min_delay_between_emails, Duration::from_millis(5));
        assert_eq!(config.queue_rate_limit, 1000);
    }
}
