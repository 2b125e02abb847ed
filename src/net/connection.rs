use std::collections::HashMap;

use tokio::time::Instant;

use crate::game::state::PeerId;

/// Bookkeeping for one open channel
#[derive(Debug, Clone)]
pub struct Connection {
    pub peer_id: PeerId,
    pub opened_at: Instant,
    pub last_activity: Instant,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl Connection {
    pub fn new(peer_id: PeerId, now: Instant) -> Self {
        Self {
            peer_id,
            opened_at: now,
            last_activity: now,
            messages_sent: 0,
            messages_received: 0,
        }
    }

    pub fn record_sent(&mut self) {
        self.messages_sent += 1;
    }

    pub fn record_received(&mut self, now: Instant) {
        self.messages_received += 1;
        self.last_activity = now;
    }
}

/// Open channels by peer. Bots never appear here.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<PeerId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened channel. Returns false if it was already known.
    pub fn insert(&mut self, peer_id: &str, now: Instant) -> bool {
        if self.connections.contains_key(peer_id) {
            return false;
        }
        self.connections
            .insert(peer_id.to_string(), Connection::new(peer_id.to_string(), now));
        true
    }

    /// Idempotent
    pub fn remove(&mut self, peer_id: &str) -> Option<Connection> {
        self.connections.remove(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<&Connection> {
        self.connections.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.connections.contains_key(peer_id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
