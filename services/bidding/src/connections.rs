//! Local connection registry
//!
//! Tracks the WebSocket connections hosted by this instance. Each
//! connection owns exactly one writer task fed by its channel, so
//! outbound frames to a single socket are never interleaved. Registration
//! hands back an RAII guard, which removes the connection on every exit
//! path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

pub type ConnectionId = u64;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<String>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection. Dropping the returned guard removes it.
    pub fn connect(self: &Arc<Self>, sender: mpsc::UnboundedSender<String>) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections.insert(id, sender);
        ConnectionGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Explicit removal; idempotent.
    pub fn disconnect(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Deliver to one connection. Returns false if it is gone or its
    /// writer has shut down.
    pub fn send(&self, id: ConnectionId, message: &str) -> bool {
        match self.connections.get(&id) {
            Some(sender) => sender.send(message.to_string()).is_ok(),
            None => false,
        }
    }

    /// Deliver to every registered connection; a failed send to one
    /// connection never aborts delivery to the rest. Returns the number of
    /// successful deliveries.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut delivered = 0;
        for entry in self.connections.iter() {
            if entry.value().send(message.to_string()).is_ok() {
                delivered += 1;
            } else {
                debug!(connection_id = *entry.key(), "skipping closed connection");
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Removes its connection from the registry when dropped.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}
