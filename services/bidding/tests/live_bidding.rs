//! End-to-end behavior over the in-process backends: admission commits
//! through the optimistic protocol, the event log carries accepted bids,
//! and every instance's fanout delivers them to its local connections in
//! log order.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use bidding::admission::BidAdmission;
use bidding::config::{Config, HISTORY_CAPACITY};
use bidding::connections::{ConnectionGuard, ConnectionRegistry};
use bidding::fanout::{Fanout, FanoutConfig};
use bidding::state::AppState;
use bidding::store::MemoryStore;
use bidding::stream::MemoryEventLog;
use types::{Bid, ServerMessage};

const RECV_WINDOW: Duration = Duration::from_secs(5);

fn fast_fanout() -> FanoutConfig {
    FanoutConfig {
        poll_batch: 10,
        poll_block: Duration::from_millis(20),
        backoff: Duration::from_millis(10),
    }
}

struct Client {
    rx: mpsc::UnboundedReceiver<String>,
    _guard: ConnectionGuard,
}

fn attach_client(registry: &Arc<ConnectionRegistry>) -> Client {
    let (tx, rx) = mpsc::unbounded_channel();
    let guard = registry.connect(tx);
    Client { rx, _guard: guard }
}

async fn recv_new_bid(client: &mut Client) -> Bid {
    let frame = timeout(RECV_WINDOW, client.rx.recv())
        .await
        .expect("timed out waiting for broadcast")
        .expect("connection channel closed");
    match serde_json::from_str::<ServerMessage>(&frame).unwrap() {
        ServerMessage::NewBid { data } => data,
        other => panic!("expected new_bid, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_submissions_fan_out_in_commit_order() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryEventLog::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let admission = Arc::new(BidAdmission::new(store.clone(), log.clone(), 3));

    let shutdown = CancellationToken::new();
    let fanout_task = tokio::spawn(
        Fanout::new(log.clone(), registry.clone(), fast_fanout()).run(shutdown.clone()),
    );

    let mut alice = attach_client(&registry);
    let mut bob = attach_client(&registry);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut submissions = Vec::new();
    for amount in 1..=30u32 {
        let admission = admission.clone();
        submissions.push(tokio::spawn(async move {
            admission.submit("racer", &json!(amount)).await.ok()
        }));
    }

    let mut accepted = Vec::new();
    for submission in submissions {
        if let Some(bid) = submission.await.unwrap() {
            accepted.push(bid);
        }
    }
    assert!(!accepted.is_empty());

    // Every local client observes the same sequence, in commit order,
    // with strictly increasing amounts.
    let mut alice_seen = Vec::new();
    let mut bob_seen = Vec::new();
    for _ in 0..accepted.len() {
        alice_seen.push(recv_new_bid(&mut alice).await);
        bob_seen.push(recv_new_bid(&mut bob).await);
    }

    let ids = |bids: &[Bid]| bids.iter().map(|b| b.bid_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&alice_seen), ids(&bob_seen));

    for pair in alice_seen.windows(2) {
        assert!(pair[0].amount < pair[1].amount);
    }

    let max_accepted = accepted.iter().map(|b| b.amount).max().unwrap();
    assert_eq!(alice_seen.last().unwrap().amount, max_accepted);

    shutdown.cancel();
    fanout_task.await.unwrap();
}

#[tokio::test]
async fn late_starting_instance_skips_prior_entries() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryEventLog::new());
    let admission = BidAdmission::new(store, log.clone(), 3);

    for amount in 1..=5u32 {
        admission.submit("early", &json!(amount)).await.unwrap();
    }

    // A second instance's broadcaster starts after those five commits.
    let late_registry = Arc::new(ConnectionRegistry::new());
    let shutdown = CancellationToken::new();
    let fanout_task = tokio::spawn(
        Fanout::new(log.clone(), late_registry.clone(), fast_fanout()).run(shutdown.clone()),
    );
    let mut client = attach_client(&late_registry);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let bid = admission.submit("late", &json!(100)).await.unwrap();
    let seen = recv_new_bid(&mut client).await;
    assert_eq!(seen.bid_id, bid.bid_id);
    assert_eq!(seen.amount, Decimal::from(100));

    // None of the five pre-existing entries were replayed.
    assert!(client.rx.try_recv().is_err());

    shutdown.cancel();
    fanout_task.await.unwrap();
}

#[tokio::test]
async fn snapshot_reflects_committed_state() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryEventLog::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let state = AppState::new(store, log, registry, Config::default());

    assert!(state.highest_bid().await.unwrap().is_none());
    assert!(state.bid_history(HISTORY_CAPACITY).await.unwrap().is_empty());

    for amount in 1..=60u32 {
        state.admission.submit("alice", &json!(amount)).await.unwrap();
    }

    let highest = state.highest_bid().await.unwrap().unwrap();
    assert_eq!(highest.amount, Decimal::from(60));

    let history = state.bid_history(HISTORY_CAPACITY).await.unwrap();
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history[0].amount, Decimal::from(60));
    assert_eq!(history[HISTORY_CAPACITY - 1].amount, Decimal::from(11));

    let trimmed = state.bid_history(10).await.unwrap();
    assert_eq!(trimmed.len(), 10);
    assert_eq!(trimmed[0].amount, Decimal::from(60));
}
