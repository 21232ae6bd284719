//! Job operations offered to the HTTP layer and the admin CLI.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobStats, JobStatus, NewJob};
use crate::jobs::runner::JobRunner;
use crate::jobs::store::{JobStore, DEFAULT_LIST_MAX_LIMIT};
use crate::queue::DispatchQueue;

pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_LIST_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct JobService {
    runner: JobRunner,
    default_max_retries: i32,
    list_max_limit: i64,
}

impl JobService {
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner,
            default_max_retries: DEFAULT_MAX_RETRIES,
            list_max_limit: DEFAULT_LIST_MAX_LIMIT,
        }
    }

    pub fn with_default_max_retries(mut self, n: i32) -> Self {
        self.default_max_retries = n.max(0);
        self
    }

    pub fn with_list_max_limit(mut self, max: i64) -> Self {
        self.list_max_limit = max.max(1);
        self
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    fn store(&self) -> &Arc<dyn JobStore> {
        self.runner.store()
    }

    fn queue(&self) -> &Arc<dyn DispatchQueue> {
        self.runner.queue()
    }

    /// Persist, then announce. If the push fails the job stays `queued` in the store and
    /// the error is returned so the caller knows it was not dispatched.
    pub async fn create_job(
        &self,
        payload: impl Into<String>,
        max_retries: Option<i32>,
    ) -> Result<Job, JobError> {
        let new_job = NewJob::new(payload, max_retries.unwrap_or(self.default_max_retries));
        let job = self.store().create(new_job).await?;

        if let Err(e) = self.queue().push(job.id).await {
            error!(job_id = %job.id, error = %e, "job stored but not enqueued");
            return Err(e);
        }

        info!(job_id = %job.id, max_retries = job.max_retries, "job created");
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job, JobError> {
        self.store().get(id).await
    }

    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Job>, JobError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=self.list_max_limit).contains(&limit) {
            return Err(JobError::Validation(format!(
                "limit must be between 1 and {}, got {limit}",
                self.list_max_limit
            )));
        }

        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(JobError::Validation(format!(
                "offset must be >= 0, got {offset}"
            )));
        }

        self.store().list(status, limit, offset).await
    }

    pub async fn job_stats(&self) -> Result<JobStats, JobError> {
        self.store().count_by_status().await
    }

    pub async fn job_count(&self, status: Option<JobStatus>) -> Result<i64, JobError> {
        self.store().count(status).await
    }

    /// Unchecked status override for manual intervention.
    pub async fn update_job_status(&self, id: Uuid, status: JobStatus) -> Result<Job, JobError> {
        let job = self.store().update_status(id, status).await?;
        info!(job_id = %id, status = %status, "job status overridden");
        Ok(job)
    }

    pub async fn delete_job(&self, id: Uuid) -> Result<Job, JobError> {
        let job = self.store().delete(id).await?;
        info!(job_id = %id, status = %job.status, "job deleted");
        Ok(job)
    }

    pub async fn requeue_job(&self, id: Uuid) -> Result<Job, JobError> {
        let job = self.store().requeue(id).await?;
        self.queue().push(id).await?;
        info!(job_id = %id, attempts = job.attempts, "job requeued");
        Ok(job)
    }

    /// Claim, run and finalize inline, bypassing the dispatch queue.
    ///
    /// Only `queued` jobs can be run this way; anything else is a `Conflict`. A stale
    /// queue entry for the job is harmless, the worker that pops it loses the claim.
    pub async fn run_job_sync(&self, id: Uuid) -> Result<Job, JobError> {
        let current = self.store().get(id).await?;
        if current.status != JobStatus::Queued {
            return Err(JobError::Conflict {
                id,
                status: current.status,
            });
        }

        let Some(claimed) = self.store().try_claim(id).await? else {
            // lost a race between the read and the claim
            let now = self.store().get(id).await?;
            return Err(JobError::Conflict {
                id,
                status: now.status,
            });
        };

        info!(job_id = %id, attempts = claimed.attempts, "running job inline");
        let finalized = self.runner.run_claimed(claimed).await?;
        Ok(finalized.into_job())
    }
}
