//! Live Bidding Service
//!
//! Accepts competing numeric bids over WebSocket and keeps every connected
//! client — across any number of horizontally-scaled instances — on a
//! consistent, live-updating view of the current winner and recent history.
//!
//! Instances never talk to each other. The shared store (single
//! highest-bid record, bounded history, id counter) and the append-only
//! event log are the only coordination points.
//!
//! # Architecture
//!
//! ```text
//!  client ──ws──▶ ┌───────────┐   watch/CAS   ┌──────────────┐
//!                 │ Admission │──────────────▶│ Shared Store │
//!                 └─────┬─────┘               └──────────────┘
//!                       │ accepted
//!                       ▼
//!                 ┌───────────┐    tail      ┌─────────────┐
//!                 │ Event Log │─────────────▶│   Fanout    │ (one per instance)
//!                 └───────────┘              └──────┬──────┘
//!                                                   ▼
//!                                         ┌──────────────────┐
//!                                         │ Connection       │──▶ clients
//!                                         │ Registry (local) │
//!                                         └──────────────────┘
//! ```

pub mod admission;
pub mod config;
pub mod connections;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod router;
pub mod state;
pub mod store;
pub mod stream;
