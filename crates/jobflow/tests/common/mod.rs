#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobflow::jobs::executor::describe_result;
use jobflow::jobs::{
    ExecutionError, InMemoryJobStore, Job, JobRunner, JobService, JobStats, JobStatus, JobStore,
    JobsRepo, NewJob, TaskExecutor, Worker, WorkerConfig,
};
use jobflow::queue::{DispatchQueue, MemoryQueue};
use jobflow::JobError;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Fails the first `failures` executions, then succeeds. Payload `"fail"` always fails.
pub struct ScriptedExecutor {
    failures_left: AtomicUsize,
    runs: Mutex<HashMap<Uuid, usize>>,
}

impl ScriptedExecutor {
    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            runs: Mutex::new(HashMap::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_first(usize::MAX)
    }

    pub fn runs_of(&self, id: Uuid) -> usize {
        self.runs.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn total_runs(&self) -> usize {
        self.runs.lock().unwrap().values().sum()
    }

    pub fn run_counts(&self) -> HashMap<Uuid, usize> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError> {
        *self.runs.lock().unwrap().entry(job.id).or_insert(0) += 1;

        if job.payload == "fail" {
            return Err(ExecutionError::new("task failed"));
        }

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ExecutionError::new("scripted failure"));
        }

        Ok(describe_result(&job.payload))
    }
}

pub struct Engine {
    pub store: Arc<InMemoryJobStore>,
    pub queue: Arc<MemoryQueue>,
    pub runner: JobRunner,
    pub service: JobService,
}

pub fn memory_engine(executor: Arc<dyn TaskExecutor>) -> Engine {
    let store = InMemoryJobStore::arc();
    let queue = Arc::new(MemoryQueue::new());
    let runner = JobRunner::new(store.clone(), queue.clone(), executor);
    let service = JobService::new(runner.clone());

    Engine {
        store,
        queue,
        runner,
        service,
    }
}

pub fn test_worker_config() -> WorkerConfig {
    WorkerConfig {
        pop_timeout: Duration::from_millis(50),
        error_backoff: Duration::from_millis(10),
        finalize_attempts: 5,
    }
}

pub fn worker(engine: &Engine, id: &str) -> Worker {
    Worker::new(
        id,
        engine.runner.clone(),
        test_worker_config(),
        CancellationToken::new(),
    )
}

/// Consume one scheduled failure, if any are left.
fn take_failure(left: &AtomicUsize) -> bool {
    left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory store whose claim and finalize writes can be told to fail with
/// `StoreUnavailable`. Everything else passes straight through.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryJobStore,
    claim_failures: AtomicUsize,
    finalize_failures: AtomicUsize,
    finalize_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_claims(&self, n: usize) {
        self.claim_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_finalizes(&self, n: usize) {
        self.finalize_failures.store(n, Ordering::SeqCst);
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    fn finalize_gate(&self) -> Result<(), JobError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.finalize_failures) {
            return Err(JobError::StoreUnavailable("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create(&self, job: NewJob) -> Result<Job, JobError> {
        self.inner.create(job).await
    }

    async fn get(&self, id: Uuid) -> Result<Job, JobError> {
        self.inner.get(id).await
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, JobError> {
        self.inner.list(status, limit, offset).await
    }

    async fn count_by_status(&self) -> Result<JobStats, JobError> {
        self.inner.count_by_status().await
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, JobError> {
        self.inner.count(status).await
    }

    async fn try_claim(&self, id: Uuid) -> Result<Option<Job>, JobError> {
        if take_failure(&self.claim_failures) {
            return Err(JobError::StoreUnavailable("connection reset".into()));
        }
        self.inner.try_claim(id).await
    }

    async fn finalize_success(&self, id: Uuid, result: &str) -> Result<Job, JobError> {
        self.finalize_gate()?;
        self.inner.finalize_success(id, result).await
    }

    async fn finalize_outcome(
        &self,
        id: Uuid,
        error: &str,
        next_status: JobStatus,
    ) -> Result<Job, JobError> {
        self.finalize_gate()?;
        self.inner.finalize_outcome(id, error, next_status).await
    }

    async fn delete(&self, id: Uuid) -> Result<Job, JobError> {
        self.inner.delete(id).await
    }

    async fn requeue(&self, id: Uuid) -> Result<Job, JobError> {
        self.inner.requeue(id).await
    }

    async fn update_status(&self, id: Uuid, status: JobStatus) -> Result<Job, JobError> {
        self.inner.update_status(id, status).await
    }

    async fn reset(&self) -> Result<u64, JobError> {
        self.inner.reset().await
    }
}

/// Memory queue whose pushes and pops can be told to fail with `QueueUnavailable`.
#[derive(Default)]
pub struct FlakyQueue {
    pub inner: MemoryQueue,
    push_failures: AtomicUsize,
    pop_failures: AtomicUsize,
    pop_calls: AtomicUsize,
}

impl FlakyQueue {
    pub fn fail_pushes(&self, n: usize) {
        self.push_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_pops(&self, n: usize) {
        self.pop_failures.store(n, Ordering::SeqCst);
    }

    pub fn pop_calls(&self) -> usize {
        self.pop_calls.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> Vec<Uuid> {
        self.inner.pending().unwrap()
    }
}

#[async_trait]
impl DispatchQueue for FlakyQueue {
    async fn push(&self, id: Uuid) -> Result<(), JobError> {
        if take_failure(&self.push_failures) {
            return Err(JobError::QueueUnavailable("broken pipe".into()));
        }
        self.inner.push(id).await
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, JobError> {
        self.pop_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.pop_failures) {
            return Err(JobError::QueueUnavailable("broken pipe".into()));
        }
        self.inner.pop_blocking(timeout).await
    }

    async fn depth(&self) -> Result<usize, JobError> {
        self.inner.depth().await
    }
}

pub struct FlakyEngine {
    pub store: Arc<FlakyStore>,
    pub queue: Arc<FlakyQueue>,
    pub runner: JobRunner,
    pub service: JobService,
}

pub fn flaky_engine(executor: Arc<dyn TaskExecutor>) -> FlakyEngine {
    let store = Arc::new(FlakyStore::default());
    let queue = Arc::new(FlakyQueue::default());
    let runner = JobRunner::new(store.clone(), queue.clone(), executor);
    let service = JobService::new(runner.clone());

    FlakyEngine {
        store,
        queue,
        runner,
        service,
    }
}

/// Postgres-backed store on `TEST_DATABASE_URL`, migrated and emptied.
/// `None` when the variable is not set, so the caller can skip.
pub async fn setup_pg() -> Option<JobsRepo> {
    let _ = dotenvy::dotenv();

    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    jobflow::db::run_migrations(&pool)
        .await
        .expect("migrations failed");

    let repo = JobsRepo::new(pool);
    repo.reset().await.expect("reset failed");
    Some(repo)
}
