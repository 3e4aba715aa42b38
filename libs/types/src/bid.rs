//! The bid domain type and its wire encodings
//!
//! A `Bid` exists only after successful admission and is immutable from that
//! point on. It travels in two shapes: JSON (shared store values, client
//! messages — `amount` as a number, `timestamp` as ISO-8601) and flat
//! string fields (event log entries — `amount` as text).

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A committed bid.
///
/// Invariant: `amount` was strictly greater than the previously committed
/// highest amount at the instant this bid was admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    /// Counter-assigned identifier, unique and strictly increasing
    /// across all instances.
    pub bid_id: String,
    /// Trimmed, non-empty bidder name.
    pub bidder: String,
    /// Positive bid amount, serialized as a JSON number.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Admission instant (UTC, ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,
}

/// Failure to decode a `Bid` from event log entry fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFieldError {
    #[error("missing stream field `{0}`")]
    Missing(&'static str),

    #[error("invalid stream field `{0}`")]
    Invalid(&'static str),
}

impl Bid {
    pub fn new(
        bid_id: impl Into<String>,
        bidder: impl Into<String>,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            bid_id: bid_id.into(),
            bidder: bidder.into(),
            amount,
            timestamp,
        }
    }

    /// Encode as flat string fields for an event log entry.
    ///
    /// `amount` is carried as text on the log per the wire contract.
    pub fn to_stream_fields(&self) -> Vec<(String, String)> {
        vec![
            ("bid_id".to_string(), self.bid_id.clone()),
            ("bidder".to_string(), self.bidder.clone()),
            ("amount".to_string(), self.amount.to_string()),
            ("timestamp".to_string(), self.timestamp.to_rfc3339()),
        ]
    }

    /// Decode from event log entry fields.
    ///
    /// A missing or unparseable field yields an error; consumers skip such
    /// entries rather than stalling the tail.
    pub fn from_stream_fields(fields: &HashMap<String, String>) -> Result<Self, StreamFieldError> {
        let bid_id = require(fields, "bid_id")?.to_string();
        let bidder = require(fields, "bidder")?.to_string();
        let amount = Decimal::from_str(require(fields, "amount")?)
            .map_err(|_| StreamFieldError::Invalid("amount"))?;
        let timestamp = DateTime::parse_from_rfc3339(require(fields, "timestamp")?)
            .map_err(|_| StreamFieldError::Invalid("timestamp"))?
            .with_timezone(&Utc);

        Ok(Self {
            bid_id,
            bidder,
            amount,
            timestamp,
        })
    }
}

fn require<'a>(
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, StreamFieldError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(StreamFieldError::Missing(name))
}
