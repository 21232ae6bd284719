//! Dispatch queue: an advisory, at-least-once channel of job ids.
//!
//! Nothing here is authoritative. An id may be popped after its job was claimed
//! elsewhere, finished, or deleted; consumers check the store before doing anything.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::JobError;

pub mod memory;
pub mod redis_list;

pub use memory::MemoryQueue;
pub use redis_list::RedisQueue;

#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Enqueue `id`. Pushing the same id twice is allowed.
    async fn push(&self, id: Uuid) -> Result<(), JobError>;

    /// Wait up to `timeout` for an id. `None` means the wait timed out.
    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, JobError>;

    /// Ids currently waiting.
    async fn depth(&self) -> Result<usize, JobError>;
}
