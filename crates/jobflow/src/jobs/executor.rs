use std::time::Duration;

use async_trait::async_trait;

use crate::jobs::model::Job;

/// Failure raised by task logic. Its message is what ends up in `Job::error`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The work a job stands for. The engine only sees success or failure.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Returns the value stored in `Job::result` on success.
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError>;
}

/// Waits `delay`, then reports the payload back.
///
/// Payloads starting with `fail_prefix` (when set) fail instead, which is how demo and
/// test jobs exercise the retry path.
#[derive(Debug, Clone, Default)]
pub struct EchoExecutor {
    delay: Duration,
    fail_prefix: Option<String>,
}

impl EchoExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_prefix: None,
        }
    }

    pub fn fail_on_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.fail_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }
}

pub fn describe_result(payload: &str) -> String {
    format!("Job finished with payload: {payload}")
}

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(prefix) = &self.fail_prefix {
            if job.payload.starts_with(prefix.as_str()) {
                return Err(ExecutionError::new(format!(
                    "simulated failure for payload {:?}",
                    job.payload
                )));
            }
        }
        Ok(describe_result(&job.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::JobStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn job(payload: &str) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            payload: payload.to_string(),
            status: JobStatus::Processing,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            attempts: 1,
            max_retries: 0,
        }
    }

    #[tokio::test]
    async fn echo_reports_payload() {
        let exec = EchoExecutor::default();
        let out = exec.execute(&job("ping")).await.unwrap();
        assert_eq!(out, "Job finished with payload: ping");
    }

    #[tokio::test]
    async fn prefix_triggers_failure() {
        let exec = EchoExecutor::new(Duration::ZERO).fail_on_prefix("fail");

        let err = exec.execute(&job("fail-3")).await.unwrap_err();
        assert!(err.message.contains("fail-3"));
        assert!(exec.execute(&job("job-3")).await.is_ok());
    }

    #[tokio::test]
    async fn empty_prefix_never_fails() {
        let exec = EchoExecutor::default().fail_on_prefix("");
        assert!(exec.execute(&job("fail")).await.is_ok());
    }
}
