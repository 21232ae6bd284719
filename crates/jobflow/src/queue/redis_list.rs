//! Redis list-backed dispatch queue (LPUSH / BRPOP).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::queue::DispatchQueue;

pub const DEFAULT_QUEUE_KEY: &str = "job_queue";

#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    // shared by pushes; BRPOP gets its own connection so it never stalls them
    conn: MultiplexedConnection,
    // connections for BRPOP not currently checked out, one per concurrent popper at most
    blocking: Arc<Mutex<Vec<MultiplexedConnection>>>,
    key: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self, JobError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            conn,
            blocking: Arc::new(Mutex::new(Vec::new())),
            key: key.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Blocking-pop connections parked for reuse.
    pub fn idle_blocking_connections(&self) -> usize {
        self.parked().len()
    }

    fn parked(&self) -> MutexGuard<'_, Vec<MultiplexedConnection>> {
        // the vec is only pushed to and popped from, so a poisoned one is still usable
        self.blocking.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, JobError> {
        let parked = self.parked().pop();
        match parked {
            Some(conn) => Ok(conn),
            None => Ok(self.client.get_multiplexed_async_connection().await?),
        }
    }

    /// Remove every pending id. Used by the admin CLI.
    pub async fn clear(&self) -> Result<(), JobError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(&self.key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DispatchQueue for RedisQueue {
    #[instrument(skip(self), fields(key = %self.key), err)]
    async fn push(&self, id: Uuid) -> Result<(), JobError> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, JobError> {
        let mut conn = self.checkout_blocking().await?;

        // BRPOP takes whole seconds on older servers; 0 would block forever
        let secs = timeout.as_secs().max(1);
        // a connection that errored is dropped rather than parked
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        self.parked().push(conn);

        let Some((_, raw)) = popped else {
            return Ok(None);
        };

        match raw.parse::<Uuid>() {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!(key = %self.key, value = %raw, error = %e, "dropping non-uuid queue entry");
                Ok(None)
            }
        }
    }

    async fn depth(&self) -> Result<usize, JobError> {
        let mut conn = self.conn.clone();
        let n: usize = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(n)
    }
}
