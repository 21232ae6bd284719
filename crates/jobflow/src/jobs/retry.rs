use crate::jobs::model::{Job, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `queued` and re-enqueued.
    Retry,
    /// Retry budget spent; the job ends `failed`.
    Exhausted,
}

impl RetryDecision {
    pub fn next_status(self) -> JobStatus {
        match self {
            RetryDecision::Retry => JobStatus::Queued,
            RetryDecision::Exhausted => JobStatus::Failed,
        }
    }
}

/// A job gets `1 + max_retries` attempts in total.
///
/// `attempts` already counts the attempt that just failed (it is bumped on claim), so
/// the job goes back to the queue while `attempts <= max_retries`.
pub fn decide(attempts: i32, max_retries: i32) -> RetryDecision {
    if attempts <= max_retries {
        RetryDecision::Retry
    } else {
        RetryDecision::Exhausted
    }
}

pub fn decide_for(job: &Job) -> RetryDecision {
    decide(job.attempts, job.max_retries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_retries_means_single_attempt() {
        assert_eq!(decide(1, 0), RetryDecision::Exhausted);
    }

    #[test]
    fn two_retries_means_three_attempts() {
        assert_eq!(decide(1, 2), RetryDecision::Retry);
        assert_eq!(decide(2, 2), RetryDecision::Retry);
        assert_eq!(decide(3, 2), RetryDecision::Exhausted);
    }

    #[test]
    fn attempts_past_budget_stay_exhausted() {
        // attempts survive administrative requeue, so they can exceed the budget
        assert_eq!(decide(7, 2), RetryDecision::Exhausted);
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(RetryDecision::Retry.next_status(), JobStatus::Queued);
        assert_eq!(RetryDecision::Exhausted.next_status(), JobStatus::Failed);
    }
}
