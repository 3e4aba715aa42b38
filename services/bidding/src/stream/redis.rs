//! Redis Streams event log backend
//!
//! Appends with XADD auto-ids; tails with blocking XREAD. Blocking reads
//! get a dedicated connection (a blocked multiplexed connection would stall
//! every other command sharing it); the connection is dropped and re-opened
//! on the next poll after a read error.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use super::{EventLog, LogCursor, LogError, LogRecord};

pub struct RedisEventLog {
    stream: String,
    client: Client,
    manager: ConnectionManager,
    reader: Mutex<Option<MultiplexedConnection>>,
}

impl RedisEventLog {
    pub async fn connect(url: &str, stream: impl Into<String>) -> Result<Self, LogError> {
        let client = Client::open(url).map_err(LogError::from)?;
        let manager = client.get_connection_manager().await.map_err(LogError::from)?;
        Ok(Self {
            stream: stream.into(),
            client,
            manager,
            reader: Mutex::new(None),
        })
    }
}

impl From<redis::RedisError> for LogError {
    fn from(err: redis::RedisError) -> Self {
        LogError::Backend(err.to_string())
    }
}

fn records_of(reply: StreamReadReply) -> Vec<LogRecord> {
    let mut records = Vec::new();
    for key in reply.keys {
        for entry in key.ids {
            let fields = entry
                .map
                .iter()
                .filter_map(|(name, value)| {
                    redis::from_redis_value::<String>(value)
                        .ok()
                        .map(|value| (name.clone(), value))
                })
                .collect();
            records.push(LogRecord {
                id: entry.id,
                fields,
            });
        }
    }
    records
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(&self, fields: &[(String, String)]) -> Result<String, LogError> {
        let mut con = self.manager.clone();
        let id: String = con.xadd(&self.stream, "*", fields).await?;
        Ok(id)
    }

    async fn latest_cursor(&self) -> Result<LogCursor, LogError> {
        let mut con = self.manager.clone();
        let reply: StreamRangeReply = con.xrevrange_count(&self.stream, "+", "-", 1).await?;
        Ok(match reply.ids.first() {
            Some(entry) => LogCursor::after(entry.id.clone()),
            // Empty or absent stream: nothing to skip.
            None => LogCursor::after("0"),
        })
    }

    async fn read_after(
        &self,
        cursor: &LogCursor,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<LogRecord>, LogError> {
        let position = cursor.position().unwrap_or("$");
        let options = StreamReadOptions::default()
            .count(max_count)
            .block(block.as_millis() as usize);

        let mut guard = self.reader.lock().await;
        let mut con = match guard.take() {
            Some(con) => con,
            None => self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(LogError::from)?,
        };

        // A block timeout yields a nil reply.
        let reply: Option<StreamReadReply> =
            match con.xread_options(&[&self.stream], &[position], &options).await {
                Ok(reply) => reply,
                // Leave the slot empty so the next poll reconnects.
                Err(err) => return Err(err.into()),
            };

        *guard = Some(con);
        Ok(reply.map(records_of).unwrap_or_default())
    }
}
