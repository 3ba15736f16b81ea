//! In-process scheduling API.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use outbox_mail::validate_mailbox;
use outbox_queue::{DelayQueue, JobPayload};
use outbox_ratelimit::{HourlyLimiter, RateSnapshot};
use outbox_store::{EmailJob, EmailStatus, JobStore, NewEmailJob, StatusOrder};

use crate::clock::Clock;
use crate::config::OutboxConfig;
use crate::error::{SchedulerError, SchedulerResult};

/// One email to schedule. The sender identity arrives pre-resolved
/// from the surrounding facade's auth layer.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    /// Sender email; the user record is upserted by this address.
    pub sender_email: String,
    /// Optional sender display name for the user record.
    pub sender_name: Option<String>,
    /// Recipient mailbox.
    pub recipient: String,
    /// Subject line, non-empty.
    pub subject: String,
    /// Message body (HTML allowed), non-empty.
    pub body: String,
    /// Absolute send time. Missing means "now".
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Relative send time in milliseconds from now. When both this and
    /// `scheduled_at` are given, the delay wins; kept from the original
    /// service, where a delay always overrode the absolute time.
    pub delay_ms: Option<i64>,
}

/// A batch of emails staggered over time.
#[derive(Debug, Clone)]
pub struct BulkScheduleRequest {
    pub sender_email: String,
    pub sender_name: Option<String>,
    /// Recipient mailboxes; one job per entry, in order.
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    /// When the first email goes out. Missing means "now".
    pub start_time: Option<DateTime<Utc>>,
    /// Spacing between consecutive emails.
    pub delay_between_ms: i64,
    /// Accepted for forward compatibility; stagger planning currently
    /// uses the configured caps, not this field.
    pub hourly_limit: Option<u64>,
}

/// What bulk scheduling returns.
#[derive(Debug, Clone)]
pub struct BulkReceipt {
    pub total_scheduled: usize,
    pub first_send_at: DateTime<Utc>,
    pub last_send_at: DateTime<Utc>,
    pub jobs: Vec<EmailJob>,
}

/// The in-process scheduling interface: write a job record, then put a
/// queue entry where the worker pool will find it at the right time.
///
/// Rate caps are not consulted here; they are enforced at dispatch so
/// a capped job is deferred rather than rejected.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DelayQueue>,
    limiter: HourlyLimiter,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
}

impl Scheduler {
    /// Create a scheduler over the given collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DelayQueue>,
        limiter: HourlyLimiter,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            queue,
            limiter,
            clock,
            config,
        }
    }

    /// Schedule a single email.
    ///
    /// On queue unavailability the error surfaces to the caller while
    /// the record stays `Scheduled`; the next recovery pass re-queues
    /// it.
    pub async fn schedule_one(&self, request: ScheduleRequest) -> SchedulerResult<EmailJob> {
        validate_content(&request.subject, &request.body)?;
        validate_recipient(&request.recipient)?;

        let user = self
            .store
            .upsert_user(&request.sender_email, request.sender_name.as_deref())
            .await?;

        let now = self.clock.now();
        let send_time = match (request.scheduled_at, request.delay_ms) {
            (_, Some(delay)) => now + Duration::milliseconds(delay),
            (Some(at), None) => at,
            (None, None) => now,
        };

        let job = self
            .store
            .create(NewEmailJob {
                user_id: user.id,
                recipient: request.recipient,
                subject: request.subject,
                body: request.body,
                scheduled_at: send_time,
            })
            .await?;

        self.enqueue_job(&job, now).await?;

        info!(
            job_id = %job.id,
            recipient = %job.recipient,
            scheduled_at = %job.scheduled_at,
            "Email scheduled"
        );
        Ok(job)
    }

    /// Schedule one email per recipient, staggered by
    /// `delay_between_ms` starting at `start_time`.
    pub async fn schedule_bulk(&self, request: BulkScheduleRequest) -> SchedulerResult<BulkReceipt> {
        if request.recipients.is_empty() {
            return Err(SchedulerError::Validation(
                "recipient list is empty".to_string(),
            ));
        }
        validate_content(&request.subject, &request.body)?;
        // All recipients are validated before the first store write.
        for recipient in &request.recipients {
            validate_recipient(recipient)?;
        }

        if request.hourly_limit.is_some() {
            debug!("Bulk hourly_limit accepted; dispatch caps come from service config");
        }

        let user = self
            .store
            .upsert_user(&request.sender_email, request.sender_name.as_deref())
            .await?;

        let now = self.clock.now();
        let start = request.start_time.unwrap_or(now);
        let step = request.delay_between_ms.max(0);

        let mut jobs = Vec::with_capacity(request.recipients.len());
        for (i, recipient) in request.recipients.iter().enumerate() {
            let send_time = start + Duration::milliseconds(step * i as i64);
            let job = self
                .store
                .create(NewEmailJob {
                    user_id: user.id,
                    recipient: recipient.clone(),
                    subject: request.subject.clone(),
                    body: request.body.clone(),
                    scheduled_at: send_time,
                })
                .await?;

            self.enqueue_job(&job, now).await?;
            jobs.push(job);
        }

        let last_send_at = start + Duration::milliseconds(step * (jobs.len() as i64 - 1));
        info!(
            total = jobs.len(),
            first_send_at = %start,
            last_send_at = %last_send_at,
            "Bulk batch scheduled"
        );

        Ok(BulkReceipt {
            total_scheduled: jobs.len(),
            first_send_at: start,
            last_send_at,
            jobs,
        })
    }

    /// Every job, newest record first.
    pub async fn list_all(&self) -> SchedulerResult<Vec<EmailJob>> {
        Ok(self.store.list_all().await?)
    }

    /// Jobs still waiting, soonest first.
    pub async fn list_scheduled(&self) -> SchedulerResult<Vec<EmailJob>> {
        Ok(self
            .store
            .list_by_status(&[EmailStatus::Scheduled], StatusOrder::ScheduledAsc)
            .await?)
    }

    /// Dispatched jobs (sent and failed), most recent first.
    pub async fn list_sent(&self) -> SchedulerResult<Vec<EmailJob>> {
        Ok(self
            .store
            .list_by_status(&[EmailStatus::Sent, EmailStatus::Failed], StatusOrder::SentDesc)
            .await?)
    }

    /// Rate counter snapshot for a sender.
    pub async fn rate_status(&self, user_id: Uuid) -> SchedulerResult<RateSnapshot> {
        Ok(self.limiter.status(user_id, self.clock.now()).await?)
    }

    async fn enqueue_job(&self, job: &EmailJob, now: DateTime<Utc>) -> SchedulerResult<()> {
        let delay_ms = (job.scheduled_at - now).num_milliseconds().max(0);
        self.queue
            .enqueue(
                &job.id.to_string(),
                JobPayload {
                    email_job_id: job.id,
                },
                delay_ms,
                self.config.transport_retry_attempts,
            )
            .await?;
        Ok(())
    }
}

fn validate_content(subject: &str, body: &str) -> SchedulerResult<()> {
    if subject.trim().is_empty() {
        return Err(SchedulerError::Validation("subject is empty".to_string()));
    }
    if body.trim().is_empty() {
        return Err(SchedulerError::Validation("body is empty".to_string()));
    }
    Ok(())
}

fn validate_recipient(recipient: &str) -> SchedulerResult<()> {
    validate_mailbox(recipient).map_err(|e| SchedulerError::Validation(e.to_string()))
}
