//! WebSocket endpoint for real-time bidding
//!
//! On connect the client receives `initial_state` assembled from the
//! shared store (never from the event log). Afterwards the socket serves
//! inbound `submit_bid` messages; accepted bids are confirmed directly to
//! the submitter while the matching `new_bid` broadcast arrives through
//! the fanout pipeline like it does for everyone else.
//!
//! All outbound frames for a connection funnel through its registry
//! channel into a single writer task, so concurrent confirmations and
//! broadcasts never interleave on the wire.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use types::{ClientMessage, ServerMessage, StateSnapshot};

use crate::admission::AdmissionError;
use crate::config::HISTORY_CAPACITY;
use crate::connections::ConnectionId;
use crate::state::AppState;

/// Generic reply when the backend fails mid-submission; details stay in
/// the logs.
const PROCESSING_UNAVAILABLE: &str = "Bid could not be processed, please try again";

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut inbound) = socket.split();
    let (tx, mut outbound) = mpsc::unbounded_channel::<String>();

    // Registration guard: the connection is removed on every exit path.
    let guard = state.registry.connect(tx);
    let connection_id = guard.id();
    info!(connection_id, "client connected");

    // Sole writer for this socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    if let Err(err) = send_initial_state(&state, connection_id).await {
        warn!(connection_id, %err, "failed to send initial state");
    }

    while let Some(Ok(message)) = inbound.next().await {
        match message {
            Message::Text(text) => handle_client_frame(&state, connection_id, text.as_str()).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(connection_id, "client disconnected");
    drop(guard);
    // The registry held the only sender; the writer drains and exits.
    let _ = writer.await;
}

async fn send_initial_state(state: &AppState, connection_id: ConnectionId) -> anyhow::Result<()> {
    let highest_bid = state.highest_bid().await?;
    let history = state.bid_history(HISTORY_CAPACITY).await?;

    send(
        state,
        connection_id,
        &ServerMessage::InitialState {
            data: StateSnapshot {
                highest_bid,
                history,
            },
        },
    );
    Ok(())
}

async fn handle_client_frame(state: &AppState, connection_id: ConnectionId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(connection_id, %err, "unparseable client frame");
            send_error(state, connection_id, "Invalid message format");
            return;
        }
    };

    match message {
        ClientMessage::SubmitBid { bidder, amount } => {
            match state.admission.submit(&bidder, &amount).await {
                Ok(bid) => {
                    // new_bid reaches this client via the fanout broadcast.
                    send(state, connection_id, &ServerMessage::BidAccepted { data: bid });
                }
                Err(AdmissionError::Rejected(reason)) => {
                    send_error(state, connection_id, &reason.to_string());
                }
                Err(err) => {
                    error!(connection_id, %err, "bid processing failed");
                    send_error(state, connection_id, PROCESSING_UNAVAILABLE);
                }
            }
        }
    }
}

fn send(state: &AppState, connection_id: ConnectionId, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(frame) => {
            if !state.registry.send(connection_id, &frame) {
                debug!(connection_id, "connection gone before reply");
            }
        }
        Err(err) => error!(connection_id, %err, "failed to encode server message"),
    }
}

fn send_error(state: &AppState, connection_id: ConnectionId, message: &str) {
    send(
        state,
        connection_id,
        &ServerMessage::Error {
            message: message.to_string(),
        },
    );
}
