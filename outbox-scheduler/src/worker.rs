//! Bounded-concurrency dispatch worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use outbox_mail::{OutboundEmail, Transport};
use outbox_queue::{DelayQueue, QueueEntry};
use outbox_ratelimit::{HourlyLimiter, ms_until_next_hour};
use outbox_store::{EmailStatus, JobStore, StatusTimestamps};

use crate::clock::Clock;
use crate::config::OutboxConfig;
use crate::error::{SchedulerError, SchedulerResult};

/// How one dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered; record is `Sent` and counters consumed.
    Sent,
    /// Idempotency gate hit: the record was already `Sent`.
    AlreadySent,
    /// The entry referenced a job the store does not have.
    NotFound,
    /// A cap is exhausted; deferred to the next window under a fresh
    /// entry, record unchanged.
    RateLimited,
    /// The transport failed; record is `Failed` and the queue applies
    /// its retry policy.
    Failed,
}

/// Pool-wide dispatch spacing: at most `per_second` dispatch starts
/// per second across every worker slot, enforced as a minimum gap
/// between consecutive starts.
struct DispatchThrottle {
    interval: Duration,
    next_start: Mutex<Option<Instant>>,
}

impl DispatchThrottle {
    fn new(per_second: u32) -> Self {
        let interval = if per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / per_second
        };
        Self {
            interval,
            next_start: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        // Reserve a slot under the lock, sleep outside it.
        let target = {
            let mut next = self.next_start.lock().await;
            let now = Instant::now();
            let target = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(target + self.interval);
            target
        };

        tokio::time::sleep_until(target).await;
    }
}

#[derive(Clone)]
struct WorkerContext {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DelayQueue>,
    limiter: HourlyLimiter,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
}

impl WorkerContext {
    /// The full dispatch pipeline for one claimed entry.
    async fn process_entry(&self, entry: &QueueEntry) -> SchedulerResult<DispatchOutcome> {
        let job_id = entry.payload.email_job_id;

        // The store is authoritative; the entry is just a pointer.
        let Some(job) = self.store.get(job_id).await? else {
            warn!(job_id = %job_id, "Entry references a missing job, acknowledging");
            self.queue.mark_completed(entry).await?;
            return Ok(DispatchOutcome::NotFound);
        };

        match job.status {
            EmailStatus::Sent => {
                debug!(job_id = %job_id, "Already sent, dropping duplicate entry");
                self.queue.mark_completed(entry).await?;
                return Ok(DispatchOutcome::AlreadySent);
            }
            EmailStatus::Failed => {
                info!(job_id = %job_id, attempts = entry.attempts, "Re-attempting failed job");
            }
            EmailStatus::Scheduled | EmailStatus::Processing => {}
        }

        let now = self.clock.now();
        let decision = self.limiter.check(job.user_id, now).await?;
        if !decision.allowed {
            // A deferral is not a transport failure: acknowledge this
            // entry and carry the job into the next window under a
            // fresh key with its own attempt budget.
            let retry_after_ms = decision
                .retry_after_ms
                .unwrap_or_else(|| ms_until_next_hour(now) + 1000);
            let retry_key = format!(
                "{}-retry-{}",
                job.id,
                now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_millis())
            );

            self.queue
                .enqueue(&retry_key, entry.payload, retry_after_ms, entry.retry_limit)
                .await?;
            self.queue.mark_completed(entry).await?;

            info!(
                job_id = %job_id,
                user_id = %job.user_id,
                scope = ?decision.scope,
                retry_after_ms = retry_after_ms,
                "Rate limited, deferred to next window"
            );
            return Ok(DispatchOutcome::RateLimited);
        }

        self.store
            .update_status(job.id, EmailStatus::Processing, StatusTimestamps::none())
            .await?;

        // Inter-send pacing runs inside the worker slot so it counts
        // against concurrency.
        tokio::time::sleep(self.config.min_delay_between_emails).await;

        let email = OutboundEmail::new(&job.recipient, &job.subject, &job.body);
        match self.transport.send(&email).await {
            Ok(outcome) => {
                self.store
                    .update_status(
                        job.id,
                        EmailStatus::Sent,
                        StatusTimestamps::sent(self.clock.now()),
                    )
                    .await?;
                // Counters move after the status write: dying between
                // the two under-counts, which is preferable to
                // over-counting real capacity away.
                self.limiter.increment(job.user_id, self.clock.now()).await?;
                self.queue.mark_completed(entry).await?;

                info!(
                    job_id = %job.id,
                    recipient = %job.recipient,
                    message_id = %outcome.message_id,
                    "Email sent"
                );
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => {
                self.store
                    .update_status(
                        job.id,
                        EmailStatus::Failed,
                        StatusTimestamps::failed(self.clock.now()),
                    )
                    .await?;
                let failure = self.queue.mark_failed(entry, &e.to_string()).await?;

                warn!(
                    job_id = %job.id,
                    error = %e,
                    queue_outcome = ?failure,
                    "Transport failure"
                );
                Ok(DispatchOutcome::Failed)
            }
        }
    }
}

/// Bounded pool of queue consumers.
///
/// `start` spawns `worker_concurrency` slots; each loops claiming
/// ready entries and running the dispatch pipeline. `stop` lets
/// in-flight dispatches finish, then joins every slot; records a dead
/// worker leaves in `Processing` are swept back to `Scheduled` by the
/// next recovery pass.
pub struct WorkerPool {
    context: WorkerContext,
    running: Arc<AtomicBool>,
    throttle: Arc<DispatchThrottle>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool over the given collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DelayQueue>,
        limiter: HourlyLimiter,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
    ) -> Self {
        let throttle = Arc::new(DispatchThrottle::new(config.queue_rate_limit));
        Self {
            context: WorkerContext {
                store,
                queue,
                limiter,
                transport,
                clock,
                config,
            },
            running: Arc::new(AtomicBool::new(false)),
            throttle,
            handles: Vec::new(),
        }
    }

    /// Spawn the consumer slots.
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::WorkerAlreadyRunning);
        }

        info!(
            concurrency = self.context.config.worker_concurrency,
            rate_limit = self.context.config.queue_rate_limit,
            "Starting worker pool"
        );

        for slot in 0..self.context.config.worker_concurrency {
            let context = self.context.clone();
            let running = self.running.clone();
            let throttle = self.throttle.clone();

            self.handles.push(tokio::spawn(async move {
                consumer_loop(slot, context, running, throttle).await;
            }));
        }

        Ok(())
    }

    /// Finish in-flight dispatches and join every slot.
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::WorkerNotRunning);
        }

        info!("Stopping worker pool");
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("Worker pool stopped");

        Ok(())
    }

    /// Whether the pool is consuming.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn consumer_loop(
    slot: usize,
    context: WorkerContext,
    running: Arc<AtomicBool>,
    throttle: Arc<DispatchThrottle>,
) {
    debug!(slot, "Worker slot started");

    while running.load(Ordering::SeqCst) {
        match context.queue.dequeue().await {
            Ok(Some(entry)) => {
                throttle.acquire().await;

                match context.process_entry(&entry).await {
                    Ok(outcome) => {
                        debug!(slot, job_key = %entry.job_key, outcome = ?outcome, "Dispatch finished");
                    }
                    Err(e) => {
                        // Store or queue trouble mid-dispatch: surface
                        // it to the queue so the entry replays; the
                        // idempotency gate makes the replay safe.
                        error!(slot, job_key = %entry.job_key, error = %e, "Dispatch errored");
                        if let Err(e) = context.queue.mark_failed(&entry, &e.to_string()).await {
                            error!(slot, error = %e, "Could not surface dispatch error to queue");
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::time::sleep(context.config.worker_poll_interval).await;
            }
            Err(e) => {
                error!(slot, error = %e, "Dequeue failed");
                tokio::time::sleep(context.config.worker_poll_interval).await;
            }
        }
    }

    debug!(slot, "Worker slot stopped");
}
