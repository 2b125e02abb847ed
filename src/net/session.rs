//! Session aggregate
//!
//! One [`Session`] per match attempt. It owns the roster, the connection
//! registry and the lifecycle; only the reducer (`net::reducer`) and the
//! transport-close path mutate them. A torn-down session is discarded and a
//! fresh one is built for the next match.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::game::constants::{building, player, spawn};
use crate::game::lifecycle::{GamePhase, Lifecycle, LifecycleError};
use crate::game::state::{random_ground_position, GameState, PeerId, Player, Roster};
use crate::game::weapons::Loadout;
use crate::lobby::directory::LobbyEntry;
use crate::net::connection::ConnectionRegistry;
use crate::util::vec3::Vec3;

/// Who is authoritative
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Host,
    Client { host: PeerId },
}

/// How a hosted session is reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Listed in the directory
    Public,
    /// Reachable by id only
    Private,
    /// In-process network, nobody else can reach it
    Offline,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Only the host can do that")]
    NotHost,
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("Session is full")]
    RosterFull,
    #[error("Only possible in the lobby")]
    NotInLobby,
    #[error("No such bot")]
    UnknownBot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Not enough materials: need {needed}, have {available}")]
    InsufficientMaterials { needed: u32, available: u32 },
    #[error("Player is eliminated")]
    Eliminated,
}

/// Per-match state
pub struct Session {
    pub(super) local_id: PeerId,
    pub(super) local_name: String,
    pub(super) role: Role,
    pub(super) visibility: Visibility,
    pub(super) connections: ConnectionRegistry,
    pub(super) state: GameState,
    pub(super) lifecycle: Lifecycle,
    pub(super) materials: u32,
    pub(super) loadout: Loadout,
    pub(super) rng: StdRng,
    pub(super) end_message: Option<String>,
    pub(super) torn_down: bool,
    pub(super) signaling_retry_used: bool,
    pub(super) next_building: u64,
}

impl Session {
    fn new(
        local_id: PeerId,
        local_name: String,
        role: Role,
        visibility: Visibility,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let position = random_ground_position(&mut rng, spawn::JOIN_HALF_EXTENT);
        let mut state = GameState::new();
        state
            .roster
            .insert(Player::new_human(local_id.clone(), local_name.clone(), position));

        Self {
            local_id,
            local_name,
            role,
            visibility,
            connections: ConnectionRegistry::new(),
            state,
            lifecycle: Lifecycle::new(),
            materials: building::STARTING_MATERIALS,
            loadout: Loadout::default(),
            rng,
            end_message: None,
            torn_down: false,
            signaling_retry_used: false,
            next_building: 0,
        }
    }

    /// Authoritative session; the local player is the first roster entry
    pub fn host(local_id: PeerId, local_name: String, visibility: Visibility, seed: Option<u64>) -> Self {
        Self::new(local_id, local_name, Role::Host, visibility, seed)
    }

    /// Mirror of `host`'s session
    pub fn client(local_id: PeerId, local_name: String, host: PeerId, seed: Option<u64>) -> Self {
        Self::new(
            local_id,
            local_name,
            Role::Client { host },
            Visibility::Private,
            seed,
        )
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    /// Host id for a client, own id for the host
    pub fn host_id(&self) -> &str {
        match &self.role {
            Role::Host => &self.local_id,
            Role::Client { host } => host,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn phase(&self) -> GamePhase {
        self.lifecycle.phase()
    }

    pub fn roster(&self) -> &Roster {
        &self.state.roster
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Count an outbound message on `peer`'s channel
    pub fn record_sent(&mut self, peer: &str) {
        if let Some(conn) = self.connections.get_mut(peer) {
            conn.record_sent();
        }
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.state.roster.get(&self.local_id)
    }

    pub fn materials(&self) -> u32 {
        self.materials
    }

    pub fn loadout(&self) -> &Loadout {
        &self.loadout
    }

    /// Message of the end screen, once the match is over
    pub fn end_message(&self) -> Option<&str> {
        self.end_message.as_deref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Directory registration for this session
    pub fn lobby_entry(&self) -> LobbyEntry {
        LobbyEntry {
            peer_id: self.local_id.clone(),
            host_name: self.local_name.clone(),
            player_count: self.state.roster.len() as u32,
            max_players: player::MAX_PLAYERS as u32,
        }
    }

    pub(super) fn is_full(&self) -> bool {
        self.state.roster.len() >= player::MAX_PLAYERS
    }

    pub(super) fn random_position(&mut self, half_extent: f32) -> Vec3 {
        random_ground_position(&mut self.rng, half_extent)
    }

    pub(super) fn require_host(&self) -> Result<(), SessionError> {
        if self.is_host() {
            Ok(())
        } else {
            Err(SessionError::NotHost)
        }
    }

    pub(super) fn require_lobby_host(&self) -> Result<(), SessionError> {
        self.require_host()?;
        if self.lifecycle.is_lobby() {
            Ok(())
        } else {
            Err(SessionError::NotInLobby)
        }
    }
}
