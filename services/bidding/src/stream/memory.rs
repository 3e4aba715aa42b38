//! In-process event log backend
//!
//! An ordered vector with 1-based sequence ids formatted as strings.
//! Poll semantics mirror the Redis backend: block up to the window for new
//! entries, return at most the requested batch.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{EventLog, LogCursor, LogError, LogRecord};

#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: Mutex<Vec<LogRecord>>,
    appended: Notify,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Entry id N is `entries[N - 1]`; reading after N starts at index N.
    fn start_index(&self, cursor: &LogCursor, len: usize) -> usize {
        match cursor.position() {
            Some(id) => id.parse::<usize>().unwrap_or(len),
            None => len,
        }
    }

    fn batch_from(&self, start: usize, max_count: usize) -> Vec<LogRecord> {
        let entries = self.lock();
        entries.iter().skip(start).take(max_count).cloned().collect()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, fields: &[(String, String)]) -> Result<String, LogError> {
        let id = {
            let mut entries = self.lock();
            let id = (entries.len() + 1).to_string();
            entries.push(LogRecord {
                id: id.clone(),
                fields: fields.iter().cloned().collect(),
            });
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn latest_cursor(&self) -> Result<LogCursor, LogError> {
        Ok(LogCursor::after(self.lock().len().to_string()))
    }

    async fn read_after(
        &self,
        cursor: &LogCursor,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<LogRecord>, LogError> {
        let start = self.start_index(cursor, self.lock().len());

        let batch = self.batch_from(start, max_count);
        if !batch.is_empty() {
            return Ok(batch);
        }

        // Register for wakeup, then re-check to close the append race.
        let notified = self.appended.notified();
        let batch = self.batch_from(start, max_count);
        if !batch.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(block, notified).await;
        Ok(self.batch_from(start, max_count))
    }
}
