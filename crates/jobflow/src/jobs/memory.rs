//! In-process job store guarded by a single mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobStats, JobStatus, NewJob};
use crate::jobs::store::{
    check_offset, check_outcome_status, clamp_limit, missing_on_finalize, JobStore,
    DEFAULT_LIST_MAX_LIMIT,
};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<Uuid, Entry>,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry {
    // insertion order, breaks created_at ties
    seq: u64,
    job: Job,
}

/// Mutex-guarded job store. Same contract as `JobsRepo`, no durability.
#[derive(Debug)]
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
    list_max_limit: i64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            list_max_limit: DEFAULT_LIST_MAX_LIMIT,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_list_max_limit(mut self, max: i64) -> Self {
        self.list_max_limit = max.max(1);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, JobError> {
        self.inner
            .lock()
            .map_err(|_| JobError::StoreUnavailable("job store lock poisoned".into()))
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn refuse_processing(job: &Job) -> Result<(), JobError> {
    if job.status == JobStatus::Processing {
        return Err(JobError::Conflict {
            id: job.id,
            status: job.status,
        });
    }
    Ok(())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<Job, JobError> {
        job.validate()?;

        let now = Utc::now();
        let created = Job {
            id: Uuid::new_v4(),
            payload: job.payload,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            attempts: 0,
            max_retries: job.max_retries,
        };

        let mut inner = self.lock()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            created.id,
            Entry {
                seq,
                job: created.clone(),
            },
        );
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Job, JobError> {
        self.lock()?
            .jobs
            .get(&id)
            .map(|e| e.job.clone())
            .ok_or(JobError::NotFound(id))
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, JobError> {
        check_offset(offset)?;
        let limit = clamp_limit(limit, self.list_max_limit) as usize;

        let inner = self.lock()?;
        let mut entries: Vec<&Entry> = inner
            .jobs
            .values()
            .filter(|e| status.map_or(true, |s| e.job.status == s))
            .collect();

        entries.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(entries
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .map(|e| e.job.clone())
            .collect())
    }

    async fn count_by_status(&self) -> Result<JobStats, JobError> {
        let inner = self.lock()?;
        let mut stats = JobStats::default();
        for e in inner.jobs.values() {
            stats.add(e.job.status, 1);
        }
        Ok(stats)
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, JobError> {
        let inner = self.lock()?;
        Ok(inner
            .jobs
            .values()
            .filter(|e| status.map_or(true, |s| e.job.status == s))
            .count() as i64)
    }

    async fn try_claim(&self, id: Uuid) -> Result<Option<Job>, JobError> {
        let mut inner = self.lock()?;
        let Some(entry) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if entry.job.status != JobStatus::Queued {
            return Ok(None);
        }

        let job = &mut entry.job;
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn finalize_success(&self, id: Uuid, result: &str) -> Result<Job, JobError> {
        let mut inner = self.lock()?;
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| missing_on_finalize(id))?;

        let job = &mut entry.job;
        job.status = JobStatus::Done;
        job.result = Some(result.to_string());
        job.error = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn finalize_outcome(
        &self,
        id: Uuid,
        error: &str,
        next_status: JobStatus,
    ) -> Result<Job, JobError> {
        check_outcome_status(id, next_status)?;

        let mut inner = self.lock()?;
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| missing_on_finalize(id))?;

        let job = &mut entry.job;
        job.status = next_status;
        job.error = Some(error.to_string());
        job.result = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<Job, JobError> {
        let mut inner = self.lock()?;
        let entry = inner.jobs.get(&id).ok_or(JobError::NotFound(id))?;
        refuse_processing(&entry.job)?;

        inner
            .jobs
            .remove(&id)
            .map(|e| e.job)
            .ok_or(JobError::NotFound(id))
    }

    async fn requeue(&self, id: Uuid) -> Result<Job, JobError> {
        let mut inner = self.lock()?;
        let entry = inner.jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        refuse_processing(&entry.job)?;

        let job = &mut entry.job;
        job.status = JobStatus::Queued;
        job.result = None;
        job.error = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn update_status(&self, id: Uuid, status: JobStatus) -> Result<Job, JobError> {
        let mut inner = self.lock()?;
        let entry = inner.jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;

        let job = &mut entry.job;
        job.status = status;
        if status != JobStatus::Done {
            job.result = None;
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn reset(&self) -> Result<u64, JobError> {
        let mut inner = self.lock()?;
        let n = inner.jobs.len() as u64;
        inner.jobs.clear();
        Ok(n)
    }
}
