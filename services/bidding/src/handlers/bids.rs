//! Read-only query endpoints and service health

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::HISTORY_CAPACITY;
use crate::error::AppError;
use crate::state::AppState;
use types::messages::empty_highest;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Bidding Application API" }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = match state.store.ping().await {
        Ok(()) => "connected",
        Err(err) => {
            warn!(%err, "store ping failed");
            "disconnected"
        }
    };
    Json(json!({ "status": "healthy", "store": store }))
}

/// Current highest bid, or the empty placeholder before any bid exists.
pub async fn highest_bid(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let value = match state.highest_bid().await? {
        Some(bid) => serde_json::to_value(bid).map_err(anyhow::Error::from)?,
        None => empty_highest(),
    };
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

/// Recent history, most-recent-first, up to `limit` (default 50).
pub async fn bid_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(HISTORY_CAPACITY);
    let history = state.bid_history(limit).await?;
    Ok(Json(json!({ "history": history })))
}
