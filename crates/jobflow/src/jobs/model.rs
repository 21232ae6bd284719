use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::JobError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: String,
    pub status: JobStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub result: Option<String>,
    pub error: Option<String>,

    pub attempts: i32,
    pub max_retries: i32,
}

impl Job {
    /// Total attempts the job may get: the first one plus `max_retries`.
    pub fn attempt_budget(&self) -> i32 {
        self.max_retries.saturating_add(1)
    }
}

/// Raw `jobs` row. Status is kept as text in the table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub payload: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub max_retries: i32,
}

impl TryFrom<JobRow> for Job {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<JobStatus>().map_err(|_| {
            JobError::Internal(format!("job {} has unknown status {:?}", row.id, row.status))
        })?;

        Ok(Job {
            id: row.id,
            payload: row.payload,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            result: row.result,
            error: row.error,
            attempts: row.attempts,
            max_retries: row.max_retries,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub payload: String,
    pub max_retries: i32,
}

impl NewJob {
    pub fn new(payload: impl Into<String>, max_retries: i32) -> Self {
        Self {
            payload: payload.into(),
            max_retries,
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.max_retries < 0 {
            return Err(JobError::Validation(format!(
                "max_retries must be >= 0, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobError::Validation(format!(
                "unknown status {other:?} (expected queued | processing | done | failed)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: i64,
    pub queued: i64,
    pub processing: i64,
    pub done: i64,
    pub failed: i64,
}

impl JobStats {
    pub fn add(&mut self, status: JobStatus, n: i64) {
        match status {
            JobStatus::Queued => self.queued += n,
            JobStatus::Processing => self.processing += n,
            JobStatus::Done => self.done += n,
            JobStatus::Failed => self.failed += n,
        }
        self.total += n;
    }

    pub fn get(&self, status: JobStatus) -> i64 {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Done => self.done,
            JobStatus::Failed => self.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Queued".parse::<JobStatus>().unwrap(), JobStatus::Queued);
        assert_eq!(" done ".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!(matches!(
            "running".parse::<JobStatus>(),
            Err(JobError::Validation(_))
        ));
    }

    #[test]
    fn status_serializes_lowercase() {
        let v = serde_json::to_value(JobStatus::Processing).unwrap();
        assert_eq!(v, serde_json::json!("processing"));
    }

    #[test]
    fn negative_max_retries_is_rejected() {
        assert!(NewJob::new("x", 0).validate().is_ok());
        assert!(matches!(
            NewJob::new("x", -1).validate(),
            Err(JobError::Validation(_))
        ));
    }

    #[test]
    fn row_with_unknown_status_is_an_internal_error() {
        let now = Utc::now();
        let row = JobRow {
            id: Uuid::new_v4(),
            payload: "p".into(),
            status: "running".into(),
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            attempts: 0,
            max_retries: 0,
        };
        assert!(matches!(Job::try_from(row), Err(JobError::Internal(_))));
    }

    #[test]
    fn attempt_budget_saturates() {
        let now = Utc::now();
        let mut job = Job {
            id: Uuid::new_v4(),
            payload: "p".into(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            attempts: 0,
            max_retries: 2,
        };
        assert_eq!(job.attempt_budget(), 3);

        job.max_retries = i32::MAX;
        assert_eq!(job.attempt_budget(), i32::MAX);
    }

    #[test]
    fn stats_add_tracks_total() {
        let mut stats = JobStats::default();
        stats.add(JobStatus::Queued, 2);
        stats.add(JobStatus::Failed, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.get(JobStatus::Queued), 2);
        assert_eq!(stats.get(JobStatus::Done), 0);
    }
}
