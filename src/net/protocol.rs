use serde::{Deserialize, Serialize};

use crate::game::constants::player::{DEFAULT_HIT_DAMAGE, MAX_HEALTH};
use crate::game::state::{Building, PeerId, Player};
use crate::game::weapons::WeaponKind;
use crate::util::vec3::Vec3;

/// Messages exchanged between peers.
///
/// JSON records tagged by `type`. Host-only kinds (`players`, `playerJoined`,
/// `startGame`, `gameEnded`) are ignored when a client sends them; the rest
/// may come from anyone and the host relays them across the star.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerMessage {
    /// Joining client introduces itself to the host
    Join { player: PlayerSnapshot },
    /// Full roster, host -> joining client
    Players { players: Vec<PlayerSnapshot> },
    /// Host -> everyone else when someone joins
    PlayerJoined { player: PlayerSnapshot },
    /// Host starts the match with the final spawn positions
    StartGame { players: Vec<PlayerSnapshot> },
    PlayerMove {
        id: PeerId,
        position: Vec3,
        #[serde(default)]
        rotation: f32,
    },
    PlayerShoot {
        id: PeerId,
        direction: Vec3,
        #[serde(default)]
        weapon: WeaponKind,
    },
    PlayerHit {
        /// Shooter
        id: PeerId,
        #[serde(rename = "targetId")]
        target_id: PeerId,
        #[serde(default = "default_hit_damage")]
        damage: i32,
    },
    PlayerRespawned { id: PeerId, position: Vec3 },
    PlayerDisconnected { id: PeerId },
    BuildingPlaced { building: Building },
    GameEnded {
        #[serde(default)]
        message: String,
    },
    /// Any `type` this build does not know
    #[serde(other)]
    Unknown,
}

fn default_hit_damage() -> i32 {
    DEFAULT_HIT_DAMAGE
}

impl PeerMessage {
    /// Wire name of the message kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Join { .. } => "join",
            PeerMessage::Players { .. } => "players",
            PeerMessage::PlayerJoined { .. } => "playerJoined",
            PeerMessage::StartGame { .. } => "startGame",
            PeerMessage::PlayerMove { .. } => "playerMove",
            PeerMessage::PlayerShoot { .. } => "playerShoot",
            PeerMessage::PlayerHit { .. } => "playerHit",
            PeerMessage::PlayerRespawned { .. } => "playerRespawned",
            PeerMessage::PlayerDisconnected { .. } => "playerDisconnected",
            PeerMessage::BuildingPlaced { .. } => "buildingPlaced",
            PeerMessage::GameEnded { .. } => "gameEnded",
            PeerMessage::Unknown => "unknown",
        }
    }

    /// Only the host may originate these
    pub fn is_host_only(&self) -> bool {
        matches!(
            self,
            PeerMessage::Players { .. }
                | PeerMessage::PlayerJoined { .. }
                | PeerMessage::StartGame { .. }
                | PeerMessage::GameEnded { .. }
        )
    }

    /// Id of the peer the message speaks for, if it carries one
    pub fn claimed_sender(&self) -> Option<&str> {
        match self {
            PeerMessage::Join { player } => Some(&player.id),
            PeerMessage::PlayerMove { id, .. }
            | PeerMessage::PlayerShoot { id, .. }
            | PeerMessage::PlayerHit { id, .. }
            | PeerMessage::PlayerRespawned { id, .. }
            | PeerMessage::PlayerDisconnected { id } => Some(id),
            PeerMessage::BuildingPlaced { building } => Some(&building.owner),
            _ => None,
        }
    }
}

/// Player record as it travels on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PeerId,
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_health")]
    pub health: i32,
    #[serde(default)]
    pub is_bot: bool,
}

fn default_health() -> i32 {
    MAX_HEALTH
}

impl PlayerSnapshot {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            position: player.position,
            rotation: player.rotation,
            health: player.health(),
            is_bot: player.is_bot(),
        }
    }

    /// Roster entry built from the wire. Bot brains on a client stay idle;
    /// only the host ticks them.
    pub fn into_player(self) -> Player {
        let mut player = if self.is_bot {
            Player::new_bot(self.id, self.name, self.position)
        } else {
            Player::new_human(self.id, self.name, self.position)
        };
        player.rotation = self.rotation;
        player.set_health(self.health);
        player
    }
}

/// Encode a message as JSON
pub fn encode(message: &PeerMessage) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(message).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a JSON message
pub fn decode(data: &[u8]) -> Result<PeerMessage, DecodeError> {
    serde_json::from_slice(data).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

/// Malformed payload. Unknown kinds are not an error; they decode to
/// [`PeerMessage::Unknown`].
#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::BuildingKind;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> PeerMessage {
        decode(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let msg = PeerMessage::PlayerHit {
            id: "a".into(),
            target_id: "b".into(),
            damage: 25,
        };
        let value: serde_json::Value = serde_json::from_slice(&encode(&msg).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "playerHit", "id": "a", "targetId": "b", "damage": 25})
        );
    }

    #[test]
    fn test_hit_damage_defaults_to_20() {
        let msg = parse(json!({"type": "playerHit", "id": "a", "targetId": "b"}));
        assert_eq!(
            msg,
            PeerMessage::PlayerHit {
                id: "a".into(),
                target_id: "b".into(),
                damage: 20
            }
        );
    }

    #[test]
    fn test_shoot_weapon_defaults_to_rifle() {
        let msg = parse(json!({
            "type": "playerShoot",
            "id": "a",
            "direction": {"x": 0.0, "y": 0.0, "z": -1.0}
        }));
        match msg {
            PeerMessage::PlayerShoot { weapon, .. } => assert_eq!(weapon, WeaponKind::Rifle),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_decodes_to_unknown() {
        let msg = parse(json!({"type": "chatMessage", "text": "gg"}));
        assert_eq!(msg, PeerMessage::Unknown);
        assert_eq!(msg.kind(), "unknown");
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(decode(b"not json").is_err());
        assert!(decode(br#"{"id":"no type"}"#).is_err());
    }

    #[test]
    fn test_snapshot_defaults() {
        let msg = parse(json!({
            "type": "join",
            "player": {"id": "p1", "name": "Nova"}
        }));
        let PeerMessage::Join { player } = msg else {
            panic!("expected join");
        };
        assert_eq!(player.health, 100);
        assert!(!player.is_bot);
        assert_eq!(player.position, Vec3::ZERO);
    }

    #[test]
    fn test_snapshot_into_player_clamps_health() {
        let snap = PlayerSnapshot {
            id: "p".into(),
            name: "P".into(),
            position: Vec3::ground(1.0, 2.0),
            rotation: 0.5,
            health: 180,
            is_bot: true,
        };
        let player = snap.into_player();
        assert_eq!(player.health(), 100);
        assert!(player.is_bot());
        assert_eq!(player.rotation, 0.5);
    }

    #[test]
    fn test_claimed_sender() {
        let building = Building {
            id: "w".into(),
            kind: BuildingKind::Ramp,
            position: Vec3::ZERO,
            rotation: 0.0,
            owner: "owner".into(),
        };
        let msg = PeerMessage::BuildingPlaced { building };
        assert_eq!(msg.claimed_sender(), Some("owner"));
        assert_eq!(
            PeerMessage::GameEnded {
                message: String::new()
            }
            .claimed_sender(),
            None
        );
        assert!(PeerMessage::StartGame { players: vec![] }.is_host_only());
    }
}
