//! Startup reconciliation between job store and delay queue.

use tracing::{debug, info};

use outbox_queue::{DelayQueue, JobPayload};
use outbox_store::{EmailStatus, JobStore, StatusTimestamps};

use crate::clock::Clock;
use crate::config::OutboxConfig;
use crate::error::SchedulerResult;

/// Re-queue every pending job, once, before the worker pool starts.
///
/// The store persists independently of the queue's broker. If the
/// broker survived a restart, `exists` keeps waiting entries from
/// being doubled; if it was wiped, every pending job gets a fresh
/// entry. `Processing` rows belong to workers that no longer exist:
/// the record is rewritten to `Scheduled` and, since a dead worker's
/// claim does not count as a waiting entry, the job is re-queued. A
/// `scheduled_at` already in the past clamps to "now": promptness
/// over exactness.
///
/// Returns the number of entries created. Running twice in a row is a
/// no-op the second time.
pub async fn run(
    store: &dyn JobStore,
    queue: &dyn DelayQueue,
    clock: &dyn Clock,
    config: &OutboxConfig,
) -> SchedulerResult<usize> {
    let pending = store.list_pending().await?;
    let now = clock.now();
    let mut requeued = 0;

    for job in pending {
        if job.status == EmailStatus::Processing {
            debug!(job_id = %job.id, "Resetting stranded PROCESSING job");
            store
                .update_status(job.id, EmailStatus::Scheduled, StatusTimestamps::none())
                .await?;
        }

        let job_key = job.id.to_string();
        if queue.exists(&job_key).await? {
            continue;
        }

        let delay_ms = (job.scheduled_at - now).num_milliseconds().max(0);
        queue
            .enqueue(
                &job_key,
                JobPayload {
                    email_job_id: job.id,
                },
                delay_ms,
                config.transport_retry_attempts,
            )
            .await?;
        requeued += 1;
    }

    info!(requeued, "Recovery pass complete");
    Ok(requeued)
}
