use async_trait::async_trait;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobStats, JobStatus, NewJob};

pub const DEFAULT_LIST_MAX_LIMIT: i64 = 200;

/// Authoritative record of all jobs.
///
/// Every operation is atomic with respect to the others. `try_claim` is the single
/// serialization point between workers: two concurrent claims of the same id never
/// both succeed.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` job with zero attempts.
    async fn create(&self, job: NewJob) -> Result<Job, JobError>;

    async fn get(&self, id: Uuid) -> Result<Job, JobError>;

    /// Newest first. `limit` is clamped to `[1, list_max_limit]`.
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, JobError>;

    async fn count_by_status(&self) -> Result<JobStats, JobError>;

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, JobError>;

    /// `queued -> processing`, bumping `attempts`.
    ///
    /// Returns `None` when the job is not `queued` (claimed elsewhere, finished or
    /// deleted). A rejected claim has no side effect.
    async fn try_claim(&self, id: Uuid) -> Result<Option<Job>, JobError>;

    async fn finalize_success(&self, id: Uuid, result: &str) -> Result<Job, JobError>;

    /// Record a failed attempt. `next_status` must be `queued` or `failed`.
    async fn finalize_outcome(
        &self,
        id: Uuid,
        error: &str,
        next_status: JobStatus,
    ) -> Result<Job, JobError>;

    /// Remove the row and return its last snapshot. Refused while `processing`.
    async fn delete(&self, id: Uuid) -> Result<Job, JobError>;

    /// Back to `queued` with `result`/`error` cleared. `attempts` is kept.
    /// Refused while `processing`.
    async fn requeue(&self, id: Uuid) -> Result<Job, JobError>;

    /// Administrative override. Does not check the transition graph, but `result` is
    /// still dropped unless the new status is `done`.
    async fn update_status(&self, id: Uuid, status: JobStatus) -> Result<Job, JobError>;

    /// Drop every job. Returns the number of rows removed.
    async fn reset(&self) -> Result<u64, JobError>;
}

pub(crate) fn clamp_limit(limit: i64, max: i64) -> i64 {
    limit.clamp(1, max.max(1))
}

pub(crate) fn check_offset(offset: i64) -> Result<(), JobError> {
    if offset < 0 {
        return Err(JobError::Validation(format!(
            "offset must be >= 0, got {offset}"
        )));
    }
    Ok(())
}

pub(crate) fn check_outcome_status(id: Uuid, next_status: JobStatus) -> Result<(), JobError> {
    match next_status {
        JobStatus::Queued | JobStatus::Failed => Ok(()),
        other => Err(JobError::Internal(format!(
            "finalize_outcome for job {id} with non-failure status {other}"
        ))),
    }
}

pub(crate) fn missing_on_finalize(id: Uuid) -> JobError {
    JobError::Internal(format!("finalize on unknown job {id}"))
}
