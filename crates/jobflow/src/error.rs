use uuid::Uuid;

use crate::jobs::model::JobStatus;

/// Errors surfaced by the lifecycle engine.
///
/// Losing a claim race is not an error: `JobStore::try_claim` reports it as `Ok(None)`.
/// Task failures are captured into the job row and never show up here either.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("job {id} is {status}")]
    Conflict { id: Uuid, status: JobStatus },

    #[error("job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("dispatch queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Transient infrastructure failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JobError::StoreUnavailable(_) | JobError::QueueUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for JobError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => JobError::StoreUnavailable(e.to_string()),
            // serialization_failure / deadlock_detected
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                JobError::StoreUnavailable(e.to_string())
            }
            _ => JobError::Internal(e.to_string()),
        }
    }
}

impl From<redis::RedisError> for JobError {
    fn from(e: redis::RedisError) -> Self {
        JobError::QueueUnavailable(e.to_string())
    }
}
