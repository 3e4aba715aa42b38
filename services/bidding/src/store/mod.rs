//! Shared store access layer
//!
//! All cross-instance state lives behind the [`SharedStore`] trait: the
//! single highest-bid record, the bounded history list, and the shared id
//! counter. The trait exposes plain read/write primitives plus the one
//! coordination primitive the admission protocol depends on:
//! [`SharedStore::compare_and_commit`], an optimistic multi-operation
//! transaction that aborts when the watched key changed since it was read.
//!
//! Two implementations: [`RedisStore`] for production (WATCH/MULTI/EXEC)
//! and [`MemoryStore`] for tests and single-instance development.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors surfaced by a store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Backend(String),
}

/// One write inside a conditional commit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set { key: String, value: String },
    ListPrepend { key: String, value: String },
    ListTrim { key: String, start: i64, stop: i64 },
}

/// Result of a conditional commit. `Conflict` is a normal outcome, not a
/// fault: the watched key changed and the caller should restart its
/// read–compare–write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Conflict,
}

/// Shared backing store primitives.
///
/// Readers never block; writers coordinate exclusively through
/// `compare_and_commit`.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Backend liveness check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn list_prepend(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Trim the list to the inclusive index range, redis-style (negative
    /// indices count from the end).
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError>;

    async fn list_range(&self, key: &str, start: i64, stop: i64)
        -> Result<Vec<String>, StoreError>;

    /// Atomically increment a shared counter, returning the new value.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Watch `watch_key`, confirm its value still equals `observed`, then
    /// atomically apply `batch`. Reports [`CommitOutcome::Conflict`] if the
    /// key changed since the caller read `observed`.
    async fn compare_and_commit(
        &self,
        watch_key: &str,
        observed: Option<&str>,
        batch: &[StoreOp],
    ) -> Result<CommitOutcome, StoreError>;
}
