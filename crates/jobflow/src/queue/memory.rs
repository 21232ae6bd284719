use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::JobError;
use crate::queue::DispatchQueue;

/// FIFO dispatch queue living in the current process.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<Uuid>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> Result<MutexGuard<'_, VecDeque<Uuid>>, JobError> {
        self.items
            .lock()
            .map_err(|_| JobError::QueueUnavailable("memory queue lock poisoned".into()))
    }

    /// Snapshot of pending ids, oldest first.
    pub fn pending(&self) -> Result<Vec<Uuid>, JobError> {
        Ok(self.items()?.iter().copied().collect())
    }
}

#[async_trait]
impl DispatchQueue for MemoryQueue {
    async fn push(&self, id: Uuid) -> Result<(), JobError> {
        self.items()?.push_back(id);
        // stores a permit when nobody is waiting yet
        self.notify.notify_one();
        Ok(())
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, JobError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(id) = self.items()?.pop_front() {
                return Ok(Some(id));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            if tokio::time::timeout(remaining, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.items()?.pop_front());
            }
        }
    }

    async fn depth(&self) -> Result<usize, JobError> {
        Ok(self.items()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn pop_times_out_when_empty() {
        let q = MemoryQueue::new();
        let got = q.pop_blocking(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn fifo_and_duplicates_allowed() {
        let q = MemoryQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.push(a).await.unwrap();
        q.push(b).await.unwrap();
        q.push(a).await.unwrap();
        assert_eq!(q.depth().await.unwrap(), 3);

        let t = Duration::from_millis(10);
        assert_eq!(q.pop_blocking(t).await.unwrap(), Some(a));
        assert_eq!(q.pop_blocking(t).await.unwrap(), Some(b));
        assert_eq!(q.pop_blocking(t).await.unwrap(), Some(a));
        assert_eq!(q.pop_blocking(t).await.unwrap(), None);
    }

    #[tokio::test]
    async fn blocked_pop_wakes_on_push() {
        let q = Arc::new(MemoryQueue::new());
        let id = Uuid::new_v4();

        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.pop_blocking(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(id).await.unwrap();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got, Some(id));
    }
}
