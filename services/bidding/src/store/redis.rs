//! Redis store backend
//!
//! Plain primitives go through a shared auto-reconnecting connection
//! manager. `compare_and_commit` needs WATCH isolation, so each call runs
//! on its own dedicated connection: WATCH, re-read, compare, then a
//! MULTI/EXEC pipeline that Redis aborts (nil EXEC reply) if the watched
//! key changed after the WATCH.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{CommitOutcome, SharedStore, StoreError, StoreOp};

pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(StoreError::from)?;
        let manager = client.get_connection_manager().await.map_err(StoreError::from)?;
        Ok(Self { client, manager })
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.manager.clone();
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let _: () = con.set(key, value).await?;
        Ok(())
    }

    async fn list_prepend(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let _: () = con.lpush(key, value).await?;
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let _: () = con.ltrim(key, start as isize, stop as isize).await?;
        Ok(())
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut con = self.manager.clone();
        let values: Vec<String> = con.lrange(key, start as isize, stop as isize).await?;
        Ok(values)
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut con = self.manager.clone();
        let value: i64 = con.incr(key, 1i64).await?;
        Ok(value)
    }

    async fn compare_and_commit(
        &self,
        watch_key: &str,
        observed: Option<&str>,
        batch: &[StoreOp],
    ) -> Result<CommitOutcome, StoreError> {
        // Dedicated connection: WATCH state is per-connection.
        let mut con = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::from)?;

        let _: () = redis::cmd("WATCH").arg(watch_key).query_async(&mut con).await?;

        let current: Option<String> = con.get(watch_key).await?;
        if current.as_deref() != observed {
            let _: () = redis::cmd("UNWATCH").query_async(&mut con).await?;
            return Ok(CommitOutcome::Conflict);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch {
            match op {
                StoreOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                StoreOp::ListPrepend { key, value } => {
                    pipe.lpush(key, value).ignore();
                }
                StoreOp::ListTrim { key, start, stop } => {
                    pipe.ltrim(key, *start as isize, *stop as isize).ignore();
                }
            }
        }

        // A nil EXEC reply means the watched key changed mid-transaction.
        let exec: Option<()> = pipe.query_async(&mut con).await?;
        Ok(match exec {
            Some(()) => CommitOutcome::Committed,
            None => CommitOutcome::Conflict,
        })
    }
}
