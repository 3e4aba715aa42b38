//! Append-only event log
//!
//! One entry is appended per accepted bid; any number of independent
//! consumers tail the log, each from its own [`LogCursor`]. A fresh cursor
//! starts at "latest": pre-existing entries are never replayed (late
//! joiners get their state from the shared store instead). Reads are
//! bounded-blocking polls — wait up to a block window, return up to a
//! batch of entries — so tailing never busy-spins.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryEventLog;
pub use self::redis::RedisEventLog;

/// Errors surfaced by a log backend.
#[derive(Debug, Clone, Error)]
pub enum LogError {
    #[error("event log backend unavailable: {0}")]
    Backend(String),
}

/// A consumer's position in the log: the identifier of the last entry it
/// has consumed, or "latest" before the first read resolves a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCursor(Option<String>);

impl LogCursor {
    /// Start at "only entries appended from this moment forward".
    pub fn latest() -> Self {
        Self(None)
    }

    /// Position directly after the given entry id.
    pub fn after(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    /// Move past a consumed entry.
    pub fn advance(&mut self, id: String) {
        self.0 = Some(id);
    }

    pub fn position(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// One entry read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Backend-assigned, strictly increasing entry identifier.
    pub id: String,
    pub fields: HashMap<String, String>,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one entry; returns the assigned entry id.
    async fn append(&self, fields: &[(String, String)]) -> Result<String, LogError>;

    /// Resolve a concrete cursor at the current end of the log, so that
    /// entries appended between subsequent polls are never missed.
    async fn latest_cursor(&self) -> Result<LogCursor, LogError>;

    /// Read up to `max_count` entries after `cursor`, blocking up to
    /// `block` when none are available. An empty result is normal.
    async fn read_after(
        &self,
        cursor: &LogCursor,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<LogRecord>, LogError>;
}
