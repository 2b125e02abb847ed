use tracing::debug;

use crate::lobby::directory::{LobbyEntry, LobbyRecord};

/// Directory-side lobby records, in first-registration order
#[derive(Debug, Clone)]
pub struct LobbyStore {
    lobbies: Vec<LobbyRecord>,
    ttl_ms: i64,
}

impl LobbyStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            lobbies: Vec::new(),
            ttl_ms: ttl_secs as i64 * 1000,
        }
    }

    /// Insert or refresh. Returns true if the lobby was not listed before.
    pub fn upsert(&mut self, entry: LobbyEntry, now_ms: i64) -> bool {
        let record = LobbyRecord {
            peer_id: entry.peer_id,
            host_name: entry.host_name,
            player_count: entry.player_count,
            max_players: entry.max_players,
            timestamp: now_ms,
        };
        match self.lobbies.iter_mut().find(|r| r.peer_id == record.peer_id) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                debug!("Lobby {} listed", record.peer_id);
                self.lobbies.push(record);
                true
            }
        }
    }

    pub fn remove(&mut self, peer_id: &str) -> bool {
        let before = self.lobbies.len();
        self.lobbies.retain(|r| r.peer_id != peer_id);
        before != self.lobbies.len()
    }

    /// Drop records older than the TTL. Returns how many went.
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let before = self.lobbies.len();
        let ttl_ms = self.ttl_ms;
        self.lobbies.retain(|r| now_ms - r.timestamp <= ttl_ms);
        before - self.lobbies.len()
    }

    pub fn list(&self) -> Vec<LobbyRecord> {
        self.lobbies.clone()
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, players: u32) -> LobbyEntry {
        LobbyEntry {
            peer_id: id.into(),
            host_name: "Nova".into(),
            player_count: players,
            max_players: 10,
        }
    }

    #[test]
    fn test_upsert_refreshes_in_place() {
        let mut store = LobbyStore::new(1800);
        assert!(store.upsert(entry("a", 1), 1_000));
        assert!(store.upsert(entry("b", 1), 2_000));
        assert!(!store.upsert(entry("a", 4), 3_000));

        let listed = store.list();
        assert_eq!(listed[0].peer_id, "a");
        assert_eq!(listed[0].player_count, 4);
        assert_eq!(listed[0].timestamp, 3_000);
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_prune_by_age() {
        let mut store = LobbyStore::new(60);
        store.upsert(entry("old", 1), 0);
        store.upsert(entry("new", 1), 50_000);

        assert_eq!(store.prune(60_000), 0);
        assert_eq!(store.prune(60_001), 1);
        assert_eq!(store.list()[0].peer_id, "new");
    }

    #[test]
    fn test_remove() {
        let mut store = LobbyStore::new(60);
        store.upsert(entry("a", 1), 0);
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }
}
