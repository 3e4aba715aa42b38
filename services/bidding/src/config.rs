//! Unified service configuration
//!
//! One configuration surface for the whole service, loaded from the
//! environment with sensible defaults. Store key names and the history
//! capacity are fixed constants shared by every instance.

use std::net::SocketAddr;
use std::time::Duration;

/// Store key holding the serialized current highest bid.
pub const HIGHEST_BID_KEY: &str = "highest_bid";
/// Store key holding the most-recent-first bid history list.
pub const BID_HISTORY_KEY: &str = "bid_history";
/// Store key holding the shared bid id counter.
pub const BID_COUNTER_KEY: &str = "bids:counter";
/// Maximum retained history entries; oldest are evicted on overflow.
pub const HISTORY_CAPACITY: usize = 50;

/// Which backing store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis backend; required for multi-instance deployments.
    Redis,
    /// In-process backend for single-instance development and tests.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket server binds to.
    pub bind_addr: SocketAddr,
    pub redis_host: String,
    pub redis_port: u16,
    /// Fixed event log stream name shared by all instances.
    pub stream_name: String,
    pub backend: StoreBackend,
    /// Bounded optimistic-commit retry budget.
    pub commit_attempts: u32,
    /// Max entries per event log poll.
    pub poll_batch: usize,
    /// Blocking window per event log poll.
    pub poll_block: Duration,
    /// Fixed delay before re-polling after a backend error.
    pub fanout_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            stream_name: "bids_stream".to_string(),
            backend: StoreBackend::Redis,
            commit_attempts: 3,
            poll_batch: 10,
            poll_block: Duration::from_millis(1000),
            fanout_backoff: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env_parsed("BIND_ADDR").unwrap_or(defaults.bind_addr),
            redis_host: env_string("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: env_parsed("REDIS_PORT").unwrap_or(defaults.redis_port),
            stream_name: env_string("STREAM_NAME").unwrap_or(defaults.stream_name),
            backend: match env_string("STORE_BACKEND").as_deref() {
                Some("memory") => StoreBackend::Memory,
                _ => StoreBackend::Redis,
            },
            ..defaults
        }
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.parse().ok())
}
