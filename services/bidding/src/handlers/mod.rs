pub mod bids;
pub mod ws;
