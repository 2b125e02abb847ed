//! Lobby directory client
//!
//! Talks to the HTTP directory (`/api/lobbies`). Registration, heartbeat and
//! unregistration are fire-and-forget from the session's point of view; a
//! failed listing is treated as "no lobbies".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::game::constants::directory::{DEFAULT_MAX_PLAYERS, DEFAULT_PLAYER_COUNT};
use crate::game::state::PeerId;

/// Registration body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyEntry {
    pub peer_id: PeerId,
    pub host_name: String,
    pub player_count: u32,
    pub max_players: u32,
}

/// Listing record; `timestamp` is milliseconds since the Unix epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRecord {
    pub peer_id: PeerId,
    pub host_name: String,
    #[serde(default = "default_player_count")]
    pub player_count: u32,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    pub timestamp: i64,
}

fn default_player_count() -> u32 {
    DEFAULT_PLAYER_COUNT
}

fn default_max_players() -> u32 {
    DEFAULT_MAX_PLAYERS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LobbyList {
    pub lobbies: Vec<LobbyRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub peer_id: PeerId,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Directory returned status {0}")]
    Status(u16),
    #[error("Directory unavailable")]
    Unavailable,
}

/// Lobby directory operations
pub trait Directory: Send + Sync + 'static {
    fn list(&self) -> impl Future<Output = Result<Vec<LobbyRecord>, DirectoryError>> + Send;

    /// Upsert; also used as the heartbeat
    fn register(&self, entry: &LobbyEntry) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    fn unregister(&self, peer_id: &str) -> impl Future<Output = Result<(), DirectoryError>> + Send;
}

/// Keep records no older than `max_age_secs` at `now_ms`, in listing order
pub fn fresh_lobbies(records: Vec<LobbyRecord>, now_ms: i64, max_age_secs: i64) -> Vec<LobbyRecord> {
    let max_age_ms = max_age_secs * 1000;
    records
        .into_iter()
        .filter(|r| now_ms - r.timestamp <= max_age_ms)
        .collect()
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// HTTP directory client
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    endpoint: String,
}

impl DirectoryClient {
    /// `base_url` without the `/api/lobbies` suffix
    pub fn new(base_url: &str) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/lobbies", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Directory for DirectoryClient {
    async fn list(&self) -> Result<Vec<LobbyRecord>, DirectoryError> {
        let response = self.client.get(&self.endpoint).send().await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status().as_u16()));
        }
        let list: LobbyList = response.json().await?;
        debug!("Directory listed {} lobbies", list.lobbies.len());
        Ok(list.lobbies)
    }

    async fn register(&self, entry: &LobbyEntry) -> Result<(), DirectoryError> {
        let response = self.client.post(&self.endpoint).json(entry).send().await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn unregister(&self, peer_id: &str) -> Result<(), DirectoryError> {
        let body = UnregisterRequest {
            peer_id: peer_id.to_string(),
        };
        let response = self.client.delete(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// In-process directory for offline play and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    records: Arc<Mutex<Vec<LobbyRecord>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record with an explicit timestamp
    pub fn insert(&self, record: LobbyRecord) {
        let mut records = self.records.lock();
        records.retain(|r| r.peer_id != record.peer_id);
        records.push(record);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn records(&self) -> Vec<LobbyRecord> {
        self.records.lock().clone()
    }

    fn check(&self) -> Result<(), DirectoryError> {
        if *self.unavailable.lock() {
            Err(DirectoryError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl Directory for InMemoryDirectory {
    async fn list(&self) -> Result<Vec<LobbyRecord>, DirectoryError> {
        self.check()?;
        Ok(self.records())
    }

    async fn register(&self, entry: &LobbyEntry) -> Result<(), DirectoryError> {
        self.check()?;
        let record = LobbyRecord {
            peer_id: entry.peer_id.clone(),
            host_name: entry.host_name.clone(),
            player_count: entry.player_count,
            max_players: entry.max_players,
            timestamp: now_millis(),
        };
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.peer_id == record.peer_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn unregister(&self, peer_id: &str) -> Result<(), DirectoryError> {
        self.check()?;
        self.records.lock().retain(|r| r.peer_id != peer_id);
        Ok(())
    }
}

/// Fetch and freshness-filter. Any failure means no lobbies.
pub async fn list_fresh<D: Directory>(directory: &D, max_age_secs: i64) -> Vec<LobbyRecord> {
    match directory.list().await {
        Ok(records) => fresh_lobbies(records, now_millis(), max_age_secs),
        Err(e) => {
            warn!("Directory listing failed, assuming no lobbies: {}", e);
            Vec::new()
        }
    }
}
