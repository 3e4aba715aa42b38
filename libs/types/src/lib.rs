//! Core types for the live bidding service
//!
//! Shared by every service crate: the `Bid` domain type with its JSON and
//! stream-field encodings, and the client/server WebSocket message schema.

pub mod bid;
pub mod messages;

pub use bid::Bid;
pub use messages::{ClientMessage, ServerMessage, StateSnapshot};
