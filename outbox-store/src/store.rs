//! The job store trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::job::{EmailJob, EmailStatus, NewEmailJob, StatusOrder, StatusTimestamps, User};

/// Durable record of every job; the source of truth for state
/// transitions.
///
/// The queue may carry stale entries (e.g. after a broker wipe and
/// recovery, or a rate-limit deferral of a job that since completed);
/// the worker filters them by re-reading this store before acting.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. Assigns the id, sets `status = Scheduled` and
    /// stamps `created_at`/`updated_at`.
    async fn create(&self, job: NewEmailJob) -> StoreResult<EmailJob>;

    /// Fetch a job by id.
    async fn get(&self, id: Uuid) -> StoreResult<Option<EmailJob>>;

    /// Atomically rewrite a job's status and transition timestamps.
    ///
    /// No precondition on the prior status: the worker is the only
    /// writer after creation and enforces idempotency by reading before
    /// writing.
    async fn update_status(
        &self,
        id: Uuid,
        status: EmailStatus,
        stamps: StatusTimestamps,
    ) -> StoreResult<()>;

    /// Jobs in any of the given statuses, in the given order.
    async fn list_by_status(
        &self,
        statuses: &[EmailStatus],
        order: StatusOrder,
    ) -> StoreResult<Vec<EmailJob>>;

    /// All jobs, newest record first.
    async fn list_all(&self) -> StoreResult<Vec<EmailJob>>;

    /// Jobs with `status ∈ {Scheduled, Processing}`; the recovery input.
    async fn list_pending(&self) -> StoreResult<Vec<EmailJob>>;

    /// Find-or-create a user by email. A provided name updates the
    /// existing record.
    async fn upsert_user(&self, email: &str, name: Option<&str>) -> StoreResult<User>;
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for std::sync::Arc<S> {
    async fn create(&self, job: NewEmailJob) -> StoreResult<EmailJob> {
        (**self).create(job).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<EmailJob>> {
        (**self).get(id).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: EmailStatus,
        stamps: StatusTimestamps,
    ) -> StoreResult<()> {
        (**self).update_status(id, status, stamps).await
    }

    async fn list_by_status(
        &self,
        statuses: &[EmailStatus],
        order: StatusOrder,
    ) -> StoreResult<Vec<EmailJob>> {
        (**self).list_by_status(statuses, order).await
    }

    async fn list_all(&self) -> StoreResult<Vec<EmailJob>> {
        (**self).list_all().await
    }

    async fn list_pending(&self) -> StoreResult<Vec<EmailJob>> {
        (**self).list_pending().await
    }

    async fn upsert_user(&self, email: &str, name: Option<&str>) -> StoreResult<User> {
        (**self).upsert_user(email, name).await
    }
}
