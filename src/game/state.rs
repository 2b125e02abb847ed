//! Game state definitions
//!
//! The roster of players (humans and bots) and the replicated world objects.
//! On the host this is ground truth; on a client it is a mirror.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::game::constants::{building, player};
use crate::game::systems::ai::BotBrain;
use crate::util::vec3::Vec3;

/// Opaque peer identity issued by the signaling layer
pub type PeerId = String;

/// What drives a player: a remote/local human, or the host's AI
#[derive(Debug, Clone)]
pub enum PlayerKind {
    Human,
    Bot(BotBrain),
}

/// Result of applying damage to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Target was already eliminated; nothing changed
    Ignored,
    /// Health dropped but the target survives
    Damaged { health: i32 },
    /// This hit eliminated the target
    Eliminated,
}

/// Player state
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PeerId,
    pub name: String,
    pub position: Vec3,
    /// Yaw in radians
    pub rotation: f32,
    health: i32,
    pub kind: PlayerKind,
    /// Last position reported over the wire (remote entities lerp toward it)
    pub target_position: Option<Vec3>,
    pub target_rotation: Option<f32>,
    /// Hidden while eliminated
    pub visible: bool,
    pub eliminated_at: Option<Instant>,
    /// Roster insertion order, assigned by [`Roster::insert`]
    join_seq: u64,
}

impl Player {
    pub fn new_human(id: PeerId, name: String, position: Vec3) -> Self {
        Self {
            id,
            name,
            position,
            rotation: 0.0,
            health: player::MAX_HEALTH,
            kind: PlayerKind::Human,
            target_position: None,
            target_rotation: None,
            visible: true,
            eliminated_at: None,
            join_seq: 0,
        }
    }

    pub fn new_bot(id: PeerId, name: String, position: Vec3) -> Self {
        Self {
            kind: PlayerKind::Bot(BotBrain::new()),
            ..Self::new_human(id, name, position)
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.kind, PlayerKind::Bot(_))
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn brain(&self) -> Option<&BotBrain> {
        match &self.kind {
            PlayerKind::Bot(brain) => Some(brain),
            PlayerKind::Human => None,
        }
    }

    pub fn brain_mut(&mut self) -> Option<&mut BotBrain> {
        match &mut self.kind {
            PlayerKind::Bot(brain) => Some(brain),
            PlayerKind::Human => None,
        }
    }

    /// Overwrite health from an authoritative source, clamped to `[0, MAX_HEALTH]`
    pub fn set_health(&mut self, health: i32) {
        self.health = health.clamp(0, player::MAX_HEALTH);
        self.visible = self.health > 0;
    }

    /// Apply damage: `max(0, health - damage)`. Negative damage is treated as zero.
    pub fn apply_damage(&mut self, damage: i32, now: Instant) -> DamageOutcome {
        if !self.is_alive() {
            return DamageOutcome::Ignored;
        }
        self.health = (self.health - damage.max(0)).max(0);
        if self.health == 0 {
            self.visible = false;
            self.eliminated_at = Some(now);
            DamageOutcome::Eliminated
        } else {
            DamageOutcome::Damaged {
                health: self.health,
            }
        }
    }

    /// Reset after elimination
    pub fn respawn(&mut self, position: Vec3) {
        self.health = player::MAX_HEALTH;
        self.position = position;
        self.target_position = None;
        self.visible = true;
        self.eliminated_at = None;
    }
}

/// All players in a session, keyed by peer id
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: HashMap<PeerId, Player>,
    next_seq: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a player. A replaced entry keeps its original join order.
    pub fn insert(&mut self, mut player: Player) {
        player.join_seq = match self.players.get(&player.id) {
            Some(existing) => existing.join_seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.players.insert(player.id.clone(), player);
    }

    pub fn remove(&mut self, id: &str) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Players in join order
    pub fn ordered(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.join_seq);
        players
    }

    pub fn bot_ids(&self) -> Vec<PeerId> {
        self.ordered()
            .into_iter()
            .filter(|p| p.is_bot())
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive()).count()
    }

    pub fn human_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_bot()).count()
    }

    pub fn bot_count(&self) -> usize {
        self.players.values().filter(|p| p.is_bot()).count()
    }

    pub fn alive_human_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| !p.is_bot() && p.is_alive())
            .count()
    }

    /// Most recently joined player that is still alive
    pub fn last_alive(&self) -> Option<&Player> {
        self.players
            .values()
            .filter(|p| p.is_alive())
            .max_by_key(|p| p.join_seq)
    }
}

/// Placeable structure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingKind {
    Wall,
    Floor,
    Ramp,
}

impl BuildingKind {
    /// Material cost, paid once by the placer
    pub fn cost(self) -> u32 {
        match self {
            BuildingKind::Wall => building::WALL_COST,
            BuildingKind::Floor => building::FLOOR_COST,
            BuildingKind::Ramp => building::RAMP_COST,
        }
    }
}

/// A replicated world object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub id: String,
    pub kind: BuildingKind,
    pub position: Vec3,
    pub rotation: f32,
    pub owner: PeerId,
}

/// Complete game state
#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub roster: Roster,
    pub buildings: Vec<Building>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a building unless one with the same id already exists
    pub fn add_building(&mut self, building: Building) -> bool {
        if self.buildings.iter().any(|b| b.id == building.id) {
            return false;
        }
        self.buildings.push(building);
        true
    }
}

/// Random point on the ground within `[-half_extent, half_extent]` on X and Z
pub fn random_ground_position<R: Rng + ?Sized>(rng: &mut R, half_extent: f32) -> Vec3 {
    Vec3::ground(
        rng.gen_range(-half_extent..half_extent),
        rng.gen_range(-half_extent..half_extent),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn human(id: &str) -> Player {
        Player::new_human(id.to_string(), id.to_uppercase(), Vec3::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn test_damage_is_clamped_and_monotonic() {
        let now = Instant::now();
        let mut p = human("a");

        assert_eq!(p.apply_damage(30, now), DamageOutcome::Damaged { health: 70 });
        assert_eq!(p.apply_damage(-50, now), DamageOutcome::Damaged { health: 70 });
        assert_eq!(p.apply_damage(500, now), DamageOutcome::Eliminated);
        assert_eq!(p.health(), 0);
        assert!(!p.visible);
        assert_eq!(p.eliminated_at, Some(now));

        // No further damage once eliminated
        assert_eq!(p.apply_damage(10, now), DamageOutcome::Ignored);
        assert_eq!(p.health(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_respawn_resets() {
        let now = Instant::now();
        let mut p = human("a");
        p.apply_damage(100, now);
        p.respawn(Vec3::ground(3.0, 4.0));
        assert_eq!(p.health(), 100);
        assert!(p.visible);
        assert!(p.eliminated_at.is_none());
        assert_eq!(p.position, Vec3::ground(3.0, 4.0));
    }

    #[test]
    fn test_set_health_clamps() {
        let mut p = human("a");
        p.set_health(250);
        assert_eq!(p.health(), 100);
        p.set_health(-4);
        assert_eq!(p.health(), 0);
        assert!(!p.visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roster_counts() {
        let now = Instant::now();
        let mut roster = Roster::new();
        roster.insert(human("a"));
        roster.insert(Player::new_bot("b1".into(), "Bot".into(), Vec3::ZERO));
        roster.insert(Player::new_bot("b2".into(), "Bot".into(), Vec3::ZERO));

        assert_eq!(roster.len(), 3);
        assert_eq!(roster.human_count(), 1);
        assert_eq!(roster.bot_count(), 2);

        roster.get_mut("a").unwrap().apply_damage(100, now);
        assert_eq!(roster.alive_count(), 2);
        assert_eq!(roster.alive_human_count(), 0);
    }

    #[test]
    fn test_roster_join_order_survives_replace() {
        let mut roster = Roster::new();
        roster.insert(human("a"));
        roster.insert(human("b"));
        roster.insert(human("a"));

        let order: Vec<&str> = roster.ordered().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(roster.last_alive().unwrap().id, "b");
    }

    #[test]
    fn test_building_costs() {
        assert_eq!(BuildingKind::Wall.cost(), 10);
        assert_eq!(BuildingKind::Ramp.cost(), 15);
    }

    #[test]
    fn test_duplicate_building_ignored() {
        let mut state = GameState::new();
        let b = Building {
            id: "w1".into(),
            kind: BuildingKind::Wall,
            position: Vec3::ZERO,
            rotation: 0.0,
            owner: "a".into(),
        };
        assert!(state.add_building(b.clone()));
        assert!(!state.add_building(b));
        assert_eq!(state.buildings.len(), 1);
    }
}
