use rand::Rng;
use tokio::time::{Duration, Instant};

use crate::game::constants::ai::*;
use crate::game::state::{PeerId, Player, Roster};
use crate::game::weapons::WeaponKind;
use crate::net::protocol::PeerMessage;
use crate::util::vec3::Vec3;

/// Bot behavior mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BotMode {
    /// Wander between random nearby waypoints
    #[default]
    Roam,
    /// Advance on and shoot at a human
    Combat,
}

/// AI state carried by every bot player
#[derive(Debug, Clone, Default)]
pub struct BotBrain {
    pub mode: BotMode,
    pub target: Option<PeerId>,
    pub waypoint: Option<Vec3>,
    pub last_decision: Option<Instant>,
    pub last_shot: Option<Instant>,
    pub last_broadcast: Option<Instant>,
}

impl BotBrain {
    pub fn new() -> Self {
        Self::default()
    }

    fn decision_due(&self, now: Instant) -> bool {
        self.last_decision
            .map_or(true, |t| now.duration_since(t) >= Duration::from_millis(DECISION_INTERVAL_MS))
    }

    fn can_fire(&self, now: Instant) -> bool {
        self.last_shot
            .map_or(true, |t| now.duration_since(t) >= Duration::from_millis(FIRE_COOLDOWN_MS))
    }

    fn can_broadcast(&self, now: Instant) -> bool {
        self.last_broadcast
            .map_or(true, |t| now.duration_since(t) >= Duration::from_millis(MOVE_BROADCAST_MS))
    }
}

/// Living human seen by the bots this tick
#[derive(Debug, Clone)]
struct Quarry {
    id: PeerId,
    position: Vec3,
}

/// Advance every living bot by `dt` seconds.
///
/// Bot positions are owned by the host, so movement is applied here directly.
/// Everything observable by other peers comes back as messages that the caller
/// feeds through the same path as the host's own actions.
pub fn update_bots<R: Rng + ?Sized>(
    roster: &mut Roster,
    now: Instant,
    dt: f32,
    rng: &mut R,
) -> Vec<PeerMessage> {
    let quarry: Vec<Quarry> = roster
        .iter()
        .filter(|p| !p.is_bot() && p.is_alive())
        .map(|p| Quarry {
            id: p.id.clone(),
            position: p.position,
        })
        .collect();

    let mut out = Vec::new();
    for bot in roster.iter_mut().filter(|p| p.is_bot() && p.is_alive()) {
        update_bot(bot, &quarry, now, dt, rng, &mut out);
    }
    out
}

fn update_bot<R: Rng + ?Sized>(
    bot: &mut Player,
    quarry: &[Quarry],
    now: Instant,
    dt: f32,
    rng: &mut R,
    out: &mut Vec<PeerMessage>,
) {
    let id = bot.id.clone();
    let position = bot.position;
    let Some(brain) = bot.brain_mut() else {
        return;
    };

    if brain.decision_due(now) {
        brain.last_decision = Some(now);
        decide_mode(brain, position, quarry, rng);
        if let Some(shot) = try_fire(brain, &id, position, quarry, now, rng) {
            out.extend(shot);
        }
    }

    if !execute_mode(bot, quarry, dt) {
        return;
    }

    let (position, rotation) = (bot.position, bot.rotation);
    if let Some(brain) = bot.brain_mut() {
        if brain.can_broadcast(now) {
            brain.last_broadcast = Some(now);
            out.push(PeerMessage::PlayerMove {
                id,
                position,
                rotation,
            });
        }
    }
}

/// Pick Roam or Combat from the nearest living human
fn decide_mode<R: Rng + ?Sized>(
    brain: &mut BotBrain,
    position: Vec3,
    quarry: &[Quarry],
    rng: &mut R,
) {
    match find_nearest_human(position, quarry) {
        Some((target, dist)) if dist <= AGGRO_RADIUS => {
            brain.mode = BotMode::Combat;
            brain.target = Some(target.id.clone());
            brain.waypoint = None;
        }
        _ => {
            brain.mode = BotMode::Roam;
            brain.target = None;
            if rng.gen_bool(WAYPOINT_CHANCE) {
                brain.waypoint = Some(Vec3::ground(
                    position.x + rng.gen_range(-WAYPOINT_RADIUS..WAYPOINT_RADIUS),
                    position.z + rng.gen_range(-WAYPOINT_RADIUS..WAYPOINT_RADIUS),
                ));
            }
        }
    }
}

/// Shoot at the combat target if in range and off cooldown
fn try_fire<R: Rng + ?Sized>(
    brain: &mut BotBrain,
    bot_id: &PeerId,
    position: Vec3,
    quarry: &[Quarry],
    now: Instant,
    rng: &mut R,
) -> Option<Vec<PeerMessage>> {
    if brain.mode != BotMode::Combat || !brain.can_fire(now) {
        return None;
    }
    let target = brain
        .target
        .as_ref()
        .and_then(|id| quarry.iter().find(|q| &q.id == id))?;
    if position.planar_distance_to(target.position) > FIRE_RANGE {
        return None;
    }

    brain.last_shot = Some(now);
    let mut shot = vec![PeerMessage::PlayerShoot {
        id: bot_id.clone(),
        direction: (target.position - position).planar().normalize(),
        weapon: WeaponKind::Pistol,
    }];
    if rng.gen_bool(HIT_CHANCE) {
        shot.push(PeerMessage::PlayerHit {
            id: bot_id.clone(),
            target_id: target.id.clone(),
            damage: DAMAGE,
        });
    }
    Some(shot)
}

/// Move according to the current mode. Returns true if the transform changed.
fn execute_mode(bot: &mut Player, quarry: &[Quarry], dt: f32) -> bool {
    let (mode, goal) = match bot.brain() {
        Some(brain) => match brain.mode {
            BotMode::Combat => (
                BotMode::Combat,
                brain
                    .target
                    .as_ref()
                    .and_then(|id| quarry.iter().find(|q| &q.id == id))
                    .map(|q| q.position),
            ),
            BotMode::Roam => (BotMode::Roam, brain.waypoint),
        },
        None => return false,
    };
    let Some(goal) = goal.map(|g| g.planar()) else {
        return false;
    };
    let (speed, stop_at) = match mode {
        BotMode::Combat => (COMBAT_SPEED, STANDOFF_DISTANCE),
        BotMode::Roam => (ROAM_SPEED, 0.0),
    };

    let from = bot.position.planar();
    let dist = from.distance_to(goal);
    let mut changed = false;
    if dist > f32::EPSILON {
        let facing = from.yaw_to(goal);
        if (facing - bot.rotation).abs() > f32::EPSILON {
            bot.rotation = facing;
            changed = true;
        }
    }

    if dist > stop_at {
        let step = (speed * dt).min(dist - stop_at);
        let next = from.move_towards(goal, step);
        bot.position = Vec3::new(next.x, bot.position.y, next.z);
        changed = true;
    }

    let arrived = bot.position.planar().approx_eq(goal, 1e-3);
    if mode == BotMode::Roam && arrived {
        if let Some(brain) = bot.brain_mut() {
            brain.waypoint = None;
        }
    }
    changed
}

/// Nearest living human by planar distance
fn find_nearest_human(position: Vec3, quarry: &[Quarry]) -> Option<(&Quarry, f32)> {
    quarry
        .iter()
        .map(|q| (q, position.planar_distance_to(q.position)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Generate bot names
pub fn generate_bot_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefixes = ["Nova", "Star", "Cosmic", "Rogue", "Luna", "Solar", "Astro", "Nebula"];
    let suffixes = ["X", "Prime", "Alpha", "Beta", "One", "Zero", "Max", "Pro"];

    format!(
        "{}{}",
        prefixes[rng.gen_range(0..prefixes.len())],
        suffixes[rng.gen_range(0..suffixes.len())]
    )
}
