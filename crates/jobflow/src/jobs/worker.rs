//! Worker loop: pop an id, claim it, execute, finalize.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::runner::{FinalizeRetry, Finalized, JobRunner};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on one blocking pop; also how often shutdown is noticed while idle.
    pub pop_timeout: Duration,
    /// Pause after a store/queue error before the next iteration, and between
    /// finalize write retries.
    pub error_backoff: Duration,
    /// Tries per finalize write while the store reports transient errors.
    pub finalize_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(500),
            finalize_attempts: 5,
        }
    }
}

/// Result of a single loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// Nothing arrived before the pop timeout.
    Idle,
    /// The popped id could not be claimed: another worker won, or the id was stale.
    Rejected(Uuid),
    Finalized(Finalized),
}

pub struct Worker {
    id: String,
    runner: JobRunner,
    cfg: WorkerConfig,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        runner: JobRunner,
        cfg: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let runner = runner
            .with_finalize_retry(FinalizeRetry {
                max_attempts: cfg.finalize_attempts,
                backoff: cfg.error_backoff,
            })
            .with_shutdown(shutdown.clone());

        Self {
            id: id.into(),
            runner,
            cfg,
            shutdown,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Idle -> Claiming -> Executing -> Finalizing, once.
    pub async fn run_once(&self) -> Result<Iteration, JobError> {
        let Some(job_id) = self
            .runner
            .queue()
            .pop_blocking(self.cfg.pop_timeout)
            .await?
        else {
            return Ok(Iteration::Idle);
        };

        let claimed = match self.runner.store().try_claim(job_id).await {
            Ok(claimed) => claimed,
            Err(e) => {
                // the row is untouched; put the id back so it is not lost with this pop
                if let Err(push_err) = self.runner.queue().push(job_id).await {
                    warn!(
                        worker_id = %self.id,
                        job_id = %job_id,
                        error = %push_err,
                        "could not return id after failed claim"
                    );
                }
                return Err(e);
            }
        };

        let Some(job) = claimed else {
            debug!(worker_id = %self.id, job_id = %job_id, "claim rejected, discarding id");
            return Ok(Iteration::Rejected(job_id));
        };

        info!(
            worker_id = %self.id,
            job_id = %job.id,
            attempts = job.attempts,
            "claimed job"
        );

        let finalized = self.runner.run_claimed(job).await?;
        Ok(Iteration::Finalized(finalized))
    }

    /// Loop until the shutdown token is cancelled. The token is only checked between
    /// iterations, so a running task is never interrupted.
    pub async fn run(self) {
        info!(worker_id = %self.id, "worker started");

        while !self.shutdown.is_cancelled() {
            if let Err(e) = self.run_once().await {
                error!(worker_id = %self.id, error = %e, "worker iteration failed");
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.cfg.error_backoff) => {}
                }
            }
        }

        info!(worker_id = %self.id, "worker stopped");
    }
}

/// A set of workers sharing one runner and one shutdown token.
pub struct WorkerPool {
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `count` workers named `{prefix}-{n}`.
    pub fn spawn(
        count: usize,
        prefix: &str,
        runner: JobRunner,
        cfg: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let mut tasks = JoinSet::new();
        for n in 1..=count.max(1) {
            let worker = Worker::new(
                format!("{prefix}-{n}"),
                runner.clone(),
                cfg.clone(),
                shutdown.clone(),
            );
            tasks.spawn(worker.run());
        }

        Self { tasks, shutdown }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every worker to return. Call `shutdown` first or this waits forever.
    pub async fn join(mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}
