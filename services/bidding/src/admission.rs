//! Bid admission: validation and the optimistic commit protocol
//!
//! A candidate bid passes a short-circuiting validation chain, then enters
//! a bounded read–compare–write cycle against the shared store: read the
//! committed highest bid, re-check strictly-greater against that fresh
//! read, and conditionally commit the new highest record, the history
//! prepend, and the history trim as one transaction watched on the
//! highest-bid key. A concurrent winner aborts the transaction and the
//! whole cycle restarts; exhausting the retry budget degrades to a normal
//! "not the highest" rejection, never a fault.
//!
//! The comparison step is a pure function; the only side effects are the
//! counter increment (id gaps from lost races are expected) and the final
//! conditional write, so retries are safe to repeat verbatim.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use types::Bid;

use crate::config::{BID_COUNTER_KEY, BID_HISTORY_KEY, HIGHEST_BID_KEY, HISTORY_CAPACITY};
use crate::store::{CommitOutcome, SharedStore, StoreError, StoreOp};
use crate::stream::{EventLog, LogError};

/// User-correctable rejection. The Display strings are the exact messages
/// surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("Bidder name is required")]
    BidderRequired,

    #[error("Invalid bid amount")]
    InvalidAmount,

    #[error("Bid amount must be greater than 0")]
    NonPositiveAmount,

    #[error("Bid must be higher than current highest bid (${})", usd(.0))]
    NotHighest(Decimal),
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Rejected(#[from] RejectReason),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("bid encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Two-decimal dollar rendering for rejection messages.
fn usd(amount: &Decimal) -> String {
    format!("{:.2}", amount.to_f64().unwrap_or_default())
}

/// Parse a raw client-submitted amount (JSON number or numeric string).
fn parse_amount(raw: &Value) -> Option<Decimal> {
    let text = match raw {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Validation rules 1–3: trimmed non-empty bidder, parseable amount,
/// positive amount. No store access, no side effects.
pub fn validate(bidder: &str, amount: &Value) -> Result<(String, Decimal), RejectReason> {
    let bidder = bidder.trim();
    if bidder.is_empty() {
        return Err(RejectReason::BidderRequired);
    }
    let amount = parse_amount(amount).ok_or(RejectReason::InvalidAmount)?;
    if amount <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveAmount);
    }
    Ok((bidder.to_string(), amount))
}

/// Rule 4: strictly greater than the committed highest. Pure; safe to
/// repeat on every retry.
fn check_exceeds(amount: Decimal, current: Decimal) -> Result<(), RejectReason> {
    if amount > current {
        Ok(())
    } else {
        Err(RejectReason::NotHighest(current))
    }
}

/// Committed highest amount behind a raw store value. A malformed stored
/// record compares as empty; the transaction still watches the raw value,
/// so no concurrent update is lost.
fn committed_amount(raw: Option<&str>) -> Decimal {
    match raw {
        None => Decimal::ZERO,
        Some(raw) => match serde_json::from_str::<Bid>(raw) {
            Ok(bid) => bid.amount,
            Err(err) => {
                warn!(%err, "stored highest bid is malformed, comparing as empty");
                Decimal::ZERO
            }
        },
    }
}

/// Validates candidate bids and commits winners to the shared store and
/// the event log.
pub struct BidAdmission {
    store: Arc<dyn SharedStore>,
    log: Arc<dyn EventLog>,
    commit_attempts: u32,
}

impl BidAdmission {
    pub fn new(store: Arc<dyn SharedStore>, log: Arc<dyn EventLog>, commit_attempts: u32) -> Self {
        Self {
            store,
            log,
            commit_attempts,
        }
    }

    /// Admit a candidate bid.
    ///
    /// Returns the committed [`Bid`] on acceptance. Rejections carry the
    /// exact client-facing reason; no state is mutated and no bid id is
    /// consumed on a validation failure.
    pub async fn submit(&self, bidder: &str, amount: &Value) -> Result<Bid, AdmissionError> {
        let (bidder, amount) = validate(bidder, amount)?;

        for attempt in 1..=self.commit_attempts {
            let observed = self.store.get(HIGHEST_BID_KEY).await?;
            check_exceeds(amount, committed_amount(observed.as_deref()))?;

            let bid_id = self.store.increment(BID_COUNTER_KEY).await?;
            let bid = Bid::new(bid_id.to_string(), bidder.clone(), amount, Utc::now());
            let encoded = serde_json::to_string(&bid)?;

            let batch = [
                StoreOp::Set {
                    key: HIGHEST_BID_KEY.to_string(),
                    value: encoded.clone(),
                },
                StoreOp::ListPrepend {
                    key: BID_HISTORY_KEY.to_string(),
                    value: encoded,
                },
                StoreOp::ListTrim {
                    key: BID_HISTORY_KEY.to_string(),
                    start: 0,
                    stop: HISTORY_CAPACITY as i64 - 1,
                },
            ];

            match self
                .store
                .compare_and_commit(HIGHEST_BID_KEY, observed.as_deref(), &batch)
                .await?
            {
                CommitOutcome::Committed => {
                    let entry_id = self.log.append(&bid.to_stream_fields()).await?;
                    info!(
                        bid_id = %bid.bid_id,
                        bidder = %bid.bidder,
                        amount = %bid.amount,
                        entry_id = %entry_id,
                        "bid accepted"
                    );
                    return Ok(bid);
                }
                CommitOutcome::Conflict => {
                    debug!(attempt, bidder = %bidder, "highest bid changed mid-commit, retrying");
                }
            }
        }

        // Retry budget exhausted: the freshest committed amount decides the
        // rejection. This is a normal outcome under contention.
        let observed = self.store.get(HIGHEST_BID_KEY).await?;
        let current = committed_amount(observed.as_deref());
        warn!(bidder = %bidder, %amount, "commit attempts exhausted, rejecting");
        Err(RejectReason::NotHighest(current).into())
    }
}
