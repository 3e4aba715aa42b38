//! Fanout broadcaster
//!
//! One long-lived task per instance tails the shared event log from its
//! own cursor and pushes every entry to the locally connected clients.
//! Instances never coordinate: each broadcaster reads the same log
//! independently, so all clients observe accepted bids in log order.
//!
//! The loop only ends through its cancellation token, checked at every
//! poll boundary — a malformed entry is skipped, an unreachable backend is
//! retried forever with a fixed backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::{Bid, ServerMessage};

use crate::config::Config;
use crate::connections::ConnectionRegistry;
use crate::stream::{EventLog, LogCursor};

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Max entries per poll.
    pub poll_batch: usize,
    /// Blocking window per poll.
    pub poll_block: Duration,
    /// Fixed delay before re-polling after a backend error.
    pub backoff: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            poll_batch: 10,
            poll_block: Duration::from_millis(1000),
            backoff: Duration::from_millis(1000),
        }
    }
}

impl From<&Config> for FanoutConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_batch: config.poll_batch,
            poll_block: config.poll_block,
            backoff: config.fanout_backoff,
        }
    }
}

pub struct Fanout {
    log: Arc<dyn EventLog>,
    registry: Arc<ConnectionRegistry>,
    config: FanoutConfig,
}

impl Fanout {
    pub fn new(
        log: Arc<dyn EventLog>,
        registry: Arc<ConnectionRegistry>,
        config: FanoutConfig,
    ) -> Self {
        Self {
            log,
            registry,
            config,
        }
    }

    /// Run until `shutdown` is cancelled. Cancellation is observed at
    /// every poll boundary; an in-progress batch is always finished first.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("fanout broadcaster started");

        let Some(mut cursor) = self.resolve_start_cursor(&shutdown).await else {
            info!("fanout broadcaster stopping");
            return;
        };

        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("fanout broadcaster stopping");
                    return;
                }
                result = self.log.read_after(&cursor, self.config.poll_batch, self.config.poll_block) => result,
            };

            match batch {
                Ok(records) => {
                    for record in records {
                        self.deliver(record.id.as_str(), &record.fields);
                        cursor.advance(record.id);
                    }
                }
                Err(err) => {
                    warn!(%err, "event log read failed, backing off");
                    if self.backoff(&shutdown).await.is_none() {
                        info!("fanout broadcaster stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Anchor the cursor at the current end of the log: entries appended
    /// before this broadcaster started are never replayed. Returns None on
    /// cancellation.
    async fn resolve_start_cursor(&self, shutdown: &CancellationToken) -> Option<LogCursor> {
        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => return None,
                result = self.log.latest_cursor() => result,
            };
            match result {
                Ok(cursor) => return Some(cursor),
                Err(err) => {
                    warn!(%err, "event log unreachable while anchoring cursor, backing off");
                    self.backoff(shutdown).await?;
                }
            }
        }
    }

    fn deliver(&self, entry_id: &str, fields: &std::collections::HashMap<String, String>) {
        let bid = match Bid::from_stream_fields(fields) {
            Ok(bid) => bid,
            Err(err) => {
                warn!(entry_id, %err, "skipping malformed log entry");
                return;
            }
        };

        match serde_json::to_string(&ServerMessage::NewBid { data: bid }) {
            Ok(message) => {
                let delivered = self.registry.broadcast(&message);
                debug!(entry_id, delivered, "broadcast new bid");
            }
            Err(err) => warn!(entry_id, %err, "failed to encode broadcast"),
        }
    }

    /// Fixed-interval, cancellation-aware backoff. Returns None on
    /// cancellation.
    async fn backoff(&self, shutdown: &CancellationToken) -> Option<()> {
        tokio::select! {
            _ = shutdown.cancelled() => None,
            _ = tokio::time::sleep(self.config.backoff) => Some(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::stream::MemoryEventLog;

    const RECV_WINDOW: Duration = Duration::from_secs(2);

    fn fast_config() -> FanoutConfig {
        FanoutConfig {
            poll_batch: 10,
            poll_block: Duration::from_millis(20),
            backoff: Duration::from_millis(10),
        }
    }

    struct Harness {
        log: Arc<MemoryEventLog>,
        registry: Arc<ConnectionRegistry>,
        shutdown: CancellationToken,
        task: tokio::task::JoinHandle<()>,
        _guard: crate::connections::ConnectionGuard,
    }

    fn spawn_fanout() -> (Harness, mpsc::UnboundedReceiver<String>) {
        let log = Arc::new(MemoryEventLog::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let guard = registry.connect(tx);

        let shutdown = CancellationToken::new();
        let fanout = Fanout::new(log.clone(), registry.clone(), fast_config());
        let task = tokio::spawn(fanout.run(shutdown.clone()));

        (
            Harness {
                log,
                registry,
                shutdown,
                task,
                _guard: guard,
            },
            rx,
        )
    }

    fn bid_fields(id: &str, amount: &str) -> Vec<(String, String)> {
        Bid::new(id, "alice", Decimal::from_str_exact(amount).unwrap(), Utc::now())
            .to_stream_fields()
    }

    async fn recv_new_bid(rx: &mut mpsc::UnboundedReceiver<String>) -> Bid {
        let frame = timeout(RECV_WINDOW, rx.recv()).await.unwrap().unwrap();
        match serde_json::from_str::<ServerMessage>(&frame).unwrap() {
            ServerMessage::NewBid { data } => data,
            other => panic!("expected new_bid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcasts_appended_entries_in_order() {
        let (harness, mut rx) = spawn_fanout();

        // Give the broadcaster a moment to anchor its cursor.
        tokio::time::sleep(Duration::from_millis(30)).await;

        harness.log.append(&bid_fields("1", "10")).await.unwrap();
        harness.log.append(&bid_fields("2", "20")).await.unwrap();

        assert_eq!(recv_new_bid(&mut rx).await.bid_id, "1");
        assert_eq!(recv_new_bid(&mut rx).await.bid_id, "2");

        harness.shutdown.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_does_not_replay_preexisting_entries() {
        let log = Arc::new(MemoryEventLog::new());
        for i in 1..=5 {
            log.append(&bid_fields(&i.to_string(), &(i * 10).to_string()))
                .await
                .unwrap();
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = registry.connect(tx);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            Fanout::new(log.clone(), registry.clone(), fast_config()).run(shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Only the entry appended after startup arrives.
        log.append(&bid_fields("6", "60")).await.unwrap();
        assert_eq!(recv_new_bid(&mut rx).await.bid_id, "6");
        assert!(rx.try_recv().is_err());

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_entry_is_skipped() {
        let (harness, mut rx) = spawn_fanout();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Entry missing its amount field
        let mut broken = bid_fields("1", "10");
        broken.retain(|(name, _)| name != "amount");
        harness.log.append(&broken).await.unwrap();
        harness.log.append(&bid_fields("2", "20")).await.unwrap();

        // Delivery continues past the malformed entry.
        assert_eq!(recv_new_bid(&mut rx).await.bid_id, "2");

        harness.shutdown.cancel();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_loop() {
        let (harness, _rx) = spawn_fanout();

        harness.shutdown.cancel();
        timeout(RECV_WINDOW, harness.task).await.unwrap().unwrap();
        assert_eq!(harness.registry.len(), 1);
    }
}
