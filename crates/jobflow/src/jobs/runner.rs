use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::executor::TaskExecutor;
use crate::jobs::model::Job;
use crate::jobs::retry::{decide_for, RetryDecision};
use crate::jobs::store::JobStore;
use crate::queue::DispatchQueue;

/// How a claimed attempt ended, with the job as finalized in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    Succeeded(Job),
    Retried(Job),
    Failed(Job),
}

impl Finalized {
    pub fn job(&self) -> &Job {
        match self {
            Finalized::Succeeded(job) | Finalized::Retried(job) | Finalized::Failed(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            Finalized::Succeeded(job) | Finalized::Retried(job) | Finalized::Failed(job) => job,
        }
    }
}

/// How hard the runner tries to record an outcome when the store is briefly unavailable.
///
/// The claimer is the only party that can move a job out of `processing`, so giving up
/// on a finalize write strands the job.
#[derive(Debug, Clone)]
pub struct FinalizeRetry {
    /// Total tries per write, including the first. At least 1.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for FinalizeRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Executes claimed jobs and writes their outcome back.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    executor: Arc<dyn TaskExecutor>,
    finalize_retry: FinalizeRetry,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            store,
            queue,
            executor,
            finalize_retry: FinalizeRetry::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_finalize_retry(mut self, retry: FinalizeRetry) -> Self {
        self.finalize_retry = retry;
        self
    }

    /// Stop retrying finalize writes once `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn DispatchQueue> {
        &self.queue
    }

    /// Run one attempt of a job this caller has just claimed, then finalize it.
    pub async fn run_claimed(&self, job: Job) -> Result<Finalized, JobError> {
        match self.executor.execute(&job).await {
            Ok(result) => self.on_success(&job, &result).await,
            Err(e) => self.on_failure(&job, &e.message).await,
        }
    }

    pub async fn on_success(&self, job: &Job, result: &str) -> Result<Finalized, JobError> {
        let done = self
            .retry_write(job.id, "finalize_success", || {
                self.store.finalize_success(job.id, result)
            })
            .await?;
        info!(job_id = %done.id, attempts = done.attempts, "job done");
        Ok(Finalized::Succeeded(done))
    }

    /// Apply the retry policy to a failed attempt.
    ///
    /// A retried job is pushed back onto the dispatch queue; nothing else would
    /// re-announce it.
    pub async fn on_failure(&self, job: &Job, message: &str) -> Result<Finalized, JobError> {
        let decision = decide_for(job);
        let next_status = decision.next_status();
        let updated = self
            .retry_write(job.id, "finalize_outcome", || {
                self.store.finalize_outcome(job.id, message, next_status)
            })
            .await?;

        match decision {
            RetryDecision::Retry => {
                warn!(
                    job_id = %updated.id,
                    attempts = updated.attempts,
                    max_retries = updated.max_retries,
                    error = message,
                    "attempt failed, retrying"
                );
                if let Err(e) = self.queue.push(updated.id).await {
                    // queued in the store but not announced; a requeue will recover it
                    error!(job_id = %updated.id, error = %e, "failed to re-enqueue job");
                    return Err(e);
                }
                Ok(Finalized::Retried(updated))
            }
            RetryDecision::Exhausted => {
                warn!(
                    job_id = %updated.id,
                    attempts = updated.attempts,
                    max_retries = updated.max_retries,
                    error = message,
                    "attempt failed, retries exhausted"
                );
                Ok(Finalized::Failed(updated))
            }
        }
    }

    /// Repeat a store write while it fails transiently. Finalize writes set absolute
    /// values, so a write that did land before the error is safe to repeat.
    async fn retry_write<T, F, Fut>(
        &self,
        job_id: Uuid,
        op: &'static str,
        mut write: F,
    ) -> Result<T, JobError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, JobError>>,
    {
        let max_attempts = self.finalize_retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match write().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        job_id = %job_id,
                        op,
                        attempt,
                        max_attempts,
                        error = %e,
                        "store write failed, retrying"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            error!(
                                job_id = %job_id,
                                op,
                                error = %e,
                                "shutdown while retrying store write"
                            );
                            return Err(e);
                        }
                        _ = tokio::time::sleep(self.finalize_retry.backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
