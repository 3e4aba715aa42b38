//! Client-facing WebSocket message schema
//!
//! One JSON object per frame, discriminated by a `type` field:
//! - server → client: `initial_state`, `bid_accepted`, `new_bid`, `error`
//! - client → server: `submit_bid`
//!
//! An absent highest bid is serialized as the empty placeholder object
//! rather than `null`, matching what clients render before the first bid.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::bid::Bid;

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current highest bid and recent history, sent once on connect.
    InitialState { data: StateSnapshot },
    /// Confirmation to the submitter of an accepted bid.
    BidAccepted { data: Bid },
    /// Broadcast of an accepted bid to every connected client.
    NewBid { data: Bid },
    /// Validation or processing failure; the connection stays open.
    Error { message: String },
}

/// Messages accepted from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubmitBid {
        #[serde(default)]
        bidder: String,
        /// Raw value so that non-numeric submissions can be rejected with
        /// a validation error instead of a parse failure.
        #[serde(default)]
        amount: Value,
    },
}

/// Snapshot of the shared state served to late-joining clients.
///
/// Replay for late joiners comes from the shared store, never from the
/// event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(with = "highest_or_placeholder")]
    pub highest_bid: Option<Bid>,
    /// Most-recent-first, at most the history capacity.
    pub history: Vec<Bid>,
}

/// The empty-placeholder object clients receive before any bid exists.
pub fn empty_highest() -> Value {
    json!({
        "amount": 0,
        "bidder": null,
        "timestamp": null,
        "bid_id": null,
    })
}

mod highest_or_placeholder {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use super::{empty_highest, Bid};

    pub fn serialize<S: Serializer>(
        value: &Option<Bid>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bid) => bid.serialize(serializer),
            None => empty_highest().serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Bid>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("bid_id").is_none_or(Value::is_null) {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some).map_err(D::Error::custom)
    }
}
