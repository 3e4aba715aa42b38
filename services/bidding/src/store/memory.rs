//! In-process store backend
//!
//! Semantics match the Redis backend: value-comparison conditional commits,
//! redis-style list index resolution, atomic counters. A single mutex
//! stands in for server-side atomicity.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CommitOutcome, SharedStore, StoreError, StoreOp};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    counters: HashMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // Lock poisoning only happens if a holder panicked; the tables are
        // still structurally valid, so recover the guard.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Tables {
    fn apply(&mut self, op: &StoreOp) {
        match op {
            StoreOp::Set { key, value } => {
                self.strings.insert(key.clone(), value.clone());
            }
            StoreOp::ListPrepend { key, value } => {
                self.lists.entry(key.clone()).or_default().push_front(value.clone());
            }
            StoreOp::ListTrim { key, start, stop } => {
                if let Some(list) = self.lists.get_mut(key) {
                    let (start, stop) = resolve_range(*start, *stop, list.len());
                    match start {
                        Some(start) if stop >= start => {
                            let kept: VecDeque<String> =
                                list.iter().skip(start).take(stop - start + 1).cloned().collect();
                            *list = kept;
                        }
                        _ => list.clear(),
                    }
                }
            }
        }
    }
}

/// Resolve redis-style inclusive indices against a list length.
fn resolve_range(start: i64, stop: i64, len: usize) -> (Option<usize>, usize) {
    let len = len as i64;
    let resolve = |index: i64| if index < 0 { len + index } else { index };

    let start = resolve(start).max(0);
    let stop = resolve(stop).min(len - 1);
    if start >= len || stop < 0 {
        return (None, 0);
    }
    (Some(start as usize), stop.max(0) as usize)
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_prepend(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        self.lock().apply(&StoreOp::ListTrim {
            key: key.to_string(),
            start,
            stop,
        });
        Ok(())
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        let tables = self.lock();
        let Some(list) = tables.lists.get(key) else {
            return Ok(Vec::new());
        };
        let (start, stop) = resolve_range(start, stop, list.len());
        Ok(match start {
            Some(start) if stop >= start => {
                list.iter().skip(start).take(stop - start + 1).cloned().collect()
            }
            _ => Vec::new(),
        })
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut tables = self.lock();
        let counter = tables.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn compare_and_commit(
        &self,
        watch_key: &str,
        observed: Option<&str>,
        batch: &[StoreOp],
    ) -> Result<CommitOutcome, StoreError> {
        let mut tables = self.lock();
        if tables.strings.get(watch_key).map(String::as_str) != observed {
            return Ok(CommitOutcome::Conflict);
        }
        for op in batch {
            tables.apply(op);
        }
        Ok(CommitOutcome::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_increment_is_monotonic() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("c").await.unwrap(), 1);
        assert_eq!(store.increment("c").await.unwrap(), 2);
        assert_eq!(store.increment("c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_list_prepend_and_range() {
        let store = MemoryStore::new();
        store.list_prepend("l", "a").await.unwrap();
        store.list_prepend("l", "b").await.unwrap();
        store.list_prepend("l", "c").await.unwrap();

        // Most-recent-first
        let all = store.list_range("l", 0, -1).await.unwrap();
        assert_eq!(all, vec!["c", "b", "a"]);

        let first_two = store.list_range("l", 0, 1).await.unwrap();
        assert_eq!(first_two, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_list_trim_caps_length() {
        let store = MemoryStore::new();
        for i in 0..6 {
            store.list_prepend("l", &i.to_string()).await.unwrap();
        }
        store.list_trim("l", 0, 3).await.unwrap();

        let all = store.list_range("l", 0, -1).await.unwrap();
        assert_eq!(all, vec!["5", "4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_range_on_missing_key() {
        let store = MemoryStore::new();
        assert!(store.list_range("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_applies_batch() {
        let store = MemoryStore::new();
        let outcome = store
            .compare_and_commit(
                "watched",
                None,
                &[
                    StoreOp::Set {
                        key: "watched".to_string(),
                        value: "v1".to_string(),
                    },
                    StoreOp::ListPrepend {
                        key: "l".to_string(),
                        value: "v1".to_string(),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(store.get("watched").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.list_range("l", 0, -1).await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_commit_conflicts_on_changed_value() {
        let store = MemoryStore::new();
        store.set("watched", "v1").await.unwrap();

        // Observed a stale value
        let outcome = store
            .compare_and_commit(
                "watched",
                Some("v0"),
                &[StoreOp::Set {
                    key: "watched".to_string(),
                    value: "v2".to_string(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Conflict);
        assert_eq!(store.get("watched").await.unwrap(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_commit_conflicts_when_key_appeared() {
        let store = MemoryStore::new();
        store.set("watched", "v1").await.unwrap();

        let outcome = store
            .compare_and_commit("watched", None, &[])
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
    }
}
