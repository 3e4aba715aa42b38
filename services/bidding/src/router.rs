use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{bids, ws};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(bids::root))
        .route("/health", get(bids::health))
        .route("/api/bids/highest", get(bids::highest_bid))
        .route("/api/bids/history", get(bids::bid_history))
        .route("/ws/bid", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
