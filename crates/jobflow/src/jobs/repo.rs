// crates/jobflow/src/jobs/repo.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobRow, JobStats, JobStatus, NewJob};
use crate::jobs::store::{
    check_offset, check_outcome_status, clamp_limit, missing_on_finalize, JobStore,
    DEFAULT_LIST_MAX_LIMIT,
};

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
    list_max_limit: i64,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            list_max_limit: DEFAULT_LIST_MAX_LIMIT,
        }
    }

    pub fn with_list_max_limit(mut self, max: i64) -> Self {
        self.list_max_limit = max.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction holding the row lock, refusing jobs that are `processing`.
    /// Dropping the returned transaction rolls it back.
    async fn lock_unless_processing(
        &self,
        id: Uuid,
    ) -> Result<Transaction<'static, Postgres>, JobError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(JobError::NotFound(id))?;

        let current = Job::try_from(current)?;
        if current.status == JobStatus::Processing {
            return Err(JobError::Conflict {
                id,
                status: current.status,
            });
        }

        Ok(tx)
    }
}

#[async_trait]
impl JobStore for JobsRepo {
    // ----------------------------
    // Create / reads
    // ----------------------------

    async fn create(&self, job: NewJob) -> Result<Job, JobError> {
        job.validate()?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (id, payload, status, created_at, updated_at, attempts, max_retries)
            VALUES ($1, $2, 'queued', clock_timestamp(), clock_timestamp(), 0, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&job.payload)
        .bind(job.max_retries)
        .fetch_one(&self.pool)
        .await?;

        Job::try_from(row)
    }

    async fn get(&self, id: Uuid) -> Result<Job, JobError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(JobError::NotFound(id))?.try_into()
    }

    /// Offset-paginated list ordered by (created_at, id) DESC.
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, JobError> {
        check_offset(offset)?;
        let limit = clamp_limit(limit, self.list_max_limit);

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT *
            FROM jobs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_status(&self) -> Result<JobStats, JobError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = JobStats::default();
        for (status, n) in rows {
            let status = status
                .parse::<JobStatus>()
                .map_err(|_| JobError::Internal(format!("unknown status in jobs: {status:?}")))?;
            stats.add(status, n);
        }
        Ok(stats)
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<i64, JobError> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE ($1::text IS NULL OR status = $1)")
                .bind(status.map(|s| s.as_str()))
                .fetch_one(&self.pool)
                .await?;
        Ok(n)
    }

    // ----------------------------
    // Claim
    // ----------------------------

    /// One conditional UPDATE. Concurrent claimers block on the row lock and re-check
    /// `status = 'queued'` against the committed version, so only one of them gets a row
    /// back.
    async fn try_claim(&self, id: Uuid) -> Result<Option<Job>, JobError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'processing',
                attempts = attempts + 1,
                updated_at = clock_timestamp()
            WHERE id = $1
              AND status = 'queued'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    // ----------------------------
    // Finalize
    // ----------------------------

    async fn finalize_success(&self, id: Uuid, result: &str) -> Result<Job, JobError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'done',
                result = $2,
                error = NULL,
                updated_at = clock_timestamp()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(result)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| missing_on_finalize(id))?.try_into()
    }

    async fn finalize_outcome(
        &self,
        id: Uuid,
        error: &str,
        next_status: JobStatus,
    ) -> Result<Job, JobError> {
        check_outcome_status(id, next_status)?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = $3,
                error = $2,
                result = NULL,
                updated_at = clock_timestamp()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| missing_on_finalize(id))?.try_into()
    }

    // ----------------------------
    // Administrative
    // ----------------------------

    async fn delete(&self, id: Uuid) -> Result<Job, JobError> {
        let mut tx = self.lock_unless_processing(id).await?;

        let row = sqlx::query_as::<_, JobRow>("DELETE FROM jobs WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Job::try_from(row)
    }

    async fn requeue(&self, id: Uuid) -> Result<Job, JobError> {
        let mut tx = self.lock_unless_processing(id).await?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'queued',
                result = NULL,
                error = NULL,
                updated_at = clock_timestamp()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Job::try_from(row)
    }

    async fn update_status(&self, id: Uuid, status: JobStatus) -> Result<Job, JobError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = $2,
                result = CASE WHEN $2 = 'done' THEN result END,
                updated_at = clock_timestamp()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(JobError::NotFound(id))?.try_into()
    }

    async fn reset(&self) -> Result<u64, JobError> {
        let res = sqlx::query("DELETE FROM jobs").execute(&self.pool).await?;
        Ok(res.rows_affected())
    }
}
