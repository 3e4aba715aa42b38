//! Shared application state
//!
//! Store and log handles are constructed once at startup and injected
//! here; components hold trait objects, never globals.

use std::sync::Arc;

use tracing::warn;
use types::Bid;

use crate::admission::BidAdmission;
use crate::config::{Config, BID_HISTORY_KEY, HIGHEST_BID_KEY};
use crate::connections::ConnectionRegistry;
use crate::store::{SharedStore, StoreError};
use crate::stream::EventLog;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SharedStore>,
    pub admission: Arc<BidAdmission>,
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SharedStore>,
        log: Arc<dyn EventLog>,
        registry: Arc<ConnectionRegistry>,
        config: Config,
    ) -> Self {
        let admission = Arc::new(BidAdmission::new(
            store.clone(),
            log,
            config.commit_attempts,
        ));
        Self {
            store,
            admission,
            registry,
            config: Arc::new(config),
        }
    }

    /// Current committed highest bid, if any.
    pub async fn highest_bid(&self) -> Result<Option<Bid>, StoreError> {
        let Some(raw) = self.store.get(HIGHEST_BID_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(bid) => Ok(Some(bid)),
            Err(err) => {
                warn!(%err, "stored highest bid is malformed");
                Ok(None)
            }
        }
    }

    /// Recent history, most-recent-first, up to `limit` entries.
    /// Malformed stored entries are skipped.
    pub async fn bid_history(&self, limit: usize) -> Result<Vec<Bid>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .store
            .list_range(BID_HISTORY_KEY, 0, limit as i64 - 1)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(bid) => Some(bid),
                Err(err) => {
                    warn!(%err, "skipping malformed history entry");
                    None
                }
            })
            .collect())
    }
}
