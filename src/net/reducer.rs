//! Protocol semantics
//!
//! Every inbound message, local action, timer and connection change goes
//! through a method here. Each returns the [`Effect`]s the runtime must carry
//! out; nothing in this file touches the network, the clock or the screen.

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::constants::{interpolation, matchmaking, spawn, timing};
use crate::game::lifecycle::evaluate;
use crate::game::state::{Building, BuildingKind, DamageOutcome, PeerId, Player};
use crate::game::systems::ai::{self, BotBrain};
use crate::game::weapons::{FireBlocked, WeaponKind};
use crate::lobby::directory::LobbyEntry;
use crate::net::protocol::{PeerMessage, PlayerSnapshot};
use crate::net::session::{BuildError, Session, SessionError, Visibility};
use crate::net::timers::TimerKind;
use crate::render::{EffectKind, RenderCommand};
use crate::util::vec3::Vec3;

/// Work for the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send { to: PeerId, message: PeerMessage },
    Broadcast(PeerMessage),
    BroadcastExcept { message: PeerMessage, except: PeerId },
    /// Close one channel
    Disconnect(PeerId),
    Render(RenderCommand),
    Schedule { after: Duration, timer: TimerKind },
    Cancel(TimerKind),
    /// Register or refresh the directory entry
    Announce(LobbyEntry),
    ReconnectSignaling,
    /// Close everything, unregister if public, and stop
    Teardown,
}

/// Where a message came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Remote(PeerId),
    /// This peer's own action (including the host's bots)
    Local,
}

type Effects = Vec<Effect>;

fn render(fx: &mut Effects, command: RenderCommand) {
    fx.push(Effect::Render(command));
}

impl Session {
    /// Apply one message
    pub fn handle(&mut self, origin: Origin, message: PeerMessage, now: Instant) -> Effects {
        let mut fx = Vec::new();
        if self.torn_down {
            return fx;
        }

        match &origin {
            Origin::Remote(from) => {
                if let Some(conn) = self.connections.get_mut(from) {
                    conn.record_received(now);
                }
                if self.is_host() {
                    if message.is_host_only() {
                        warn!("Dropping host-only {} from {}", message.kind(), from);
                        return fx;
                    }
                    let spoofed = !matches!(message, PeerMessage::Join { .. })
                        && message.claimed_sender().is_some_and(|claimed| claimed != from);
                    if spoofed {
                        warn!("Dropping {} from {} speaking for someone else", message.kind(), from);
                        return fx;
                    }
                    let joined = matches!(message, PeerMessage::Join { .. }) || self.state.roster.contains(from);
                    if !joined {
                        warn!("Dropping {} from {} before it joined", message.kind(), from);
                        return fx;
                    }
                    if !matches!(message, PeerMessage::Join { .. } | PeerMessage::Unknown) {
                        fx.push(Effect::BroadcastExcept {
                            message: message.clone(),
                            except: from.clone(),
                        });
                    }
                } else if from != self.host_id() {
                    debug!("Ignoring {} from non-host {}", message.kind(), from);
                    return fx;
                }
            }
            Origin::Local => fx.push(Effect::Broadcast(message.clone())),
        }

        debug!("Applying {} ({:?})", message.kind(), origin);
        match message {
            PeerMessage::Join { player } => {
                if let Origin::Remote(from) = origin {
                    self.on_join(from, player, &mut fx);
                }
            }
            PeerMessage::Players { players } => self.on_players(players),
            PeerMessage::PlayerJoined { player } => self.on_player_joined(player, &mut fx),
            PeerMessage::StartGame { players } => self.on_start_game(players, &mut fx),
            PeerMessage::PlayerMove {
                id,
                position,
                rotation,
            } => self.on_move(&origin, id, position, rotation, &mut fx),
            PeerMessage::PlayerShoot {
                id,
                direction,
                weapon,
            } => {
                if let Some(shooter) = self.state.roster.get(&id) {
                    render(
                        &mut fx,
                        RenderCommand::PlayEffect {
                            kind: EffectKind::Trail { weapon },
                            origin: shooter.position,
                            direction,
                        },
                    );
                }
            }
            PeerMessage::PlayerHit {
                id,
                target_id,
                damage,
            } => self.on_hit(id, target_id, damage, now, &mut fx),
            PeerMessage::PlayerRespawned { id, position } => {
                self.on_respawned(id, position, &mut fx)
            }
            PeerMessage::PlayerDisconnected { id } => self.on_disconnected(id, &mut fx),
            PeerMessage::BuildingPlaced { building } => {
                if self.state.add_building(building.clone()) {
                    render(&mut fx, RenderCommand::PlaceStructure(building));
                }
            }
            PeerMessage::GameEnded { message } => self.on_game_ended(message, &mut fx),
            PeerMessage::Unknown => debug!("Ignoring unknown message kind"),
        }
        fx
    }

    fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.state
            .roster
            .ordered()
            .into_iter()
            .map(PlayerSnapshot::from_player)
            .collect()
    }

    fn on_join(&mut self, from: PeerId, player: PlayerSnapshot, fx: &mut Effects) {
        if !self.is_host() || self.lifecycle.is_ended() {
            return;
        }
        let known = self.state.roster.contains(&from);
        if !known && self.is_full() {
            warn!("Refusing {}: session is full", from);
            fx.push(Effect::Disconnect(from));
            return;
        }

        let mut joined = Player::new_human(from.clone(), player.name, player.position);
        joined.rotation = player.rotation;
        let snapshot = PlayerSnapshot::from_player(&joined);
        self.state.roster.insert(joined);
        info!(
            "{} ({}) joined, {} players",
            snapshot.name,
            from,
            self.state.roster.len()
        );

        fx.push(Effect::Send {
            to: from.clone(),
            message: PeerMessage::Players {
                players: self.snapshots(),
            },
        });
        fx.push(Effect::BroadcastExcept {
            message: PeerMessage::PlayerJoined {
                player: snapshot.clone(),
            },
            except: from.clone(),
        });

        if self.lifecycle.in_progress() {
            fx.push(Effect::Send {
                to: from,
                message: PeerMessage::StartGame {
                    players: self.snapshots(),
                },
            });
            render(fx, RenderCommand::SpawnEntity(snapshot));
        }
    }

    fn on_players(&mut self, players: Vec<PlayerSnapshot>) {
        if self.is_host() {
            return;
        }
        for snapshot in players {
            if snapshot.id != self.local_id {
                self.state.roster.insert(snapshot.into_player());
            }
        }
        debug!("Roster now has {} players", self.state.roster.len());
    }

    fn on_player_joined(&mut self, player: PlayerSnapshot, fx: &mut Effects) {
        if self.is_host() || player.id == self.local_id {
            return;
        }
        info!("{} joined", player.name);
        if self.lifecycle.in_progress() {
            render(fx, RenderCommand::SpawnEntity(player.clone()));
        }
        self.state.roster.insert(player.into_player());
    }

    fn on_start_game(&mut self, players: Vec<PlayerSnapshot>, fx: &mut Effects) {
        if self.is_host() {
            return;
        }
        if let Err(e) = self.lifecycle.start() {
            debug!("Ignoring startGame: {}", e);
            return;
        }
        info!("Match started with {} players", players.len());

        for snapshot in players {
            if snapshot.id == self.local_id {
                if let Some(me) = self.state.roster.get_mut(&self.local_id) {
                    me.position = snapshot.position;
                    me.rotation = snapshot.rotation;
                }
                continue;
            }
            render(fx, RenderCommand::SpawnEntity(snapshot.clone()));
            self.state.roster.insert(snapshot.into_player());
        }
    }

    fn on_move(&mut self, origin: &Origin, id: PeerId, position: Vec3, rotation: f32, fx: &mut Effects) {
        let Some(player) = self.state.roster.get_mut(&id) else {
            return;
        };
        match origin {
            Origin::Local => {
                player.position = position;
                player.rotation = rotation;
                if player.is_bot() {
                    render(
                        fx,
                        RenderCommand::UpdateTransform {
                            id,
                            position,
                            rotation,
                        },
                    );
                }
            }
            Origin::Remote(_) => {
                if id == self.local_id {
                    return;
                }
                player.target_position = Some(position);
                player.target_rotation = Some(rotation);
            }
        }
    }

    fn on_hit(&mut self, shooter: PeerId, target_id: PeerId, damage: i32, now: Instant, fx: &mut Effects) {
        if !self.lifecycle.in_progress() {
            debug!("Ignoring hit outside a match");
            return;
        }
        let is_self = target_id == self.local_id;
        let Some(target) = self.state.roster.get_mut(&target_id) else {
            return;
        };
        let position = target.position;
        let target_is_bot = target.is_bot();
        let target_name = target.name.clone();

        match target.apply_damage(damage, now) {
            DamageOutcome::Ignored => return,
            DamageOutcome::Damaged { health } => {
                debug!("{} hit {} for {} ({} left)", shooter, target_id, damage, health);
                if is_self {
                    render(
                        fx,
                        RenderCommand::PlayEffect {
                            kind: EffectKind::Hit,
                            origin: position,
                            direction: Vec3::ZERO,
                        },
                    );
                }
                return;
            }
            DamageOutcome::Eliminated => {
                info!("{} eliminated by {}", target_name, shooter);
            }
        }

        let respawn_after = Duration::from_millis(timing::RESPAWN_DELAY_MS);
        if is_self {
            render(
                fx,
                RenderCommand::PlayEffect {
                    kind: EffectKind::Elimination,
                    origin: position,
                    direction: Vec3::ZERO,
                },
            );
            fx.push(Effect::Schedule {
                after: respawn_after,
                timer: TimerKind::SelfRespawn,
            });
        } else {
            render(fx, RenderCommand::RemoveEntity(target_id.clone()));
            if self.is_host() && target_is_bot {
                fx.push(Effect::Schedule {
                    after: respawn_after,
                    timer: TimerKind::BotRespawn(target_id),
                });
            }
        }
        self.check_end(fx);
    }

    fn on_respawned(&mut self, id: PeerId, position: Vec3, fx: &mut Effects) {
        let Some(player) = self.state.roster.get_mut(&id) else {
            return;
        };
        player.respawn(position);
        if let Some(brain) = player.brain_mut() {
            *brain = BotBrain::new();
        }
        let snapshot = PlayerSnapshot::from_player(player);
        debug!("{} respawned", snapshot.name);

        if id == self.local_id {
            render(
                fx,
                RenderCommand::UpdateTransform {
                    id,
                    position,
                    rotation: snapshot.rotation,
                },
            );
        } else {
            render(fx, RenderCommand::SpawnEntity(snapshot));
        }
        self.check_end(fx);
    }

    fn on_disconnected(&mut self, id: PeerId, fx: &mut Effects) {
        if id == self.local_id {
            return;
        }
        self.connections.remove(&id);
        if let Some(player) = self.state.roster.remove(&id) {
            info!("{} left", player.name);
            render(fx, RenderCommand::RemoveEntity(id.clone()));
        }
        fx.push(Effect::Cancel(TimerKind::BotRespawn(id)));
        self.check_end(fx);
    }

    fn on_game_ended(&mut self, message: String, fx: &mut Effects) {
        if self.is_host() {
            return;
        }
        info!("Host ended the match: {}", message);
        let _ = self.lifecycle.end();
        self.end_message = Some(message.clone());
        render(fx, RenderCommand::ShowEndScreen(message));
        self.teardown(fx);
    }

    /// Host-side end-condition check; ends the match at most once
    fn check_end(&mut self, fx: &mut Effects) {
        if !self.is_host() || !self.lifecycle.in_progress() {
            return;
        }
        let Some(reason) = evaluate(&self.state.roster) else {
            return;
        };
        if let Err(e) = self.lifecycle.end() {
            warn!("Could not end match: {}", e);
            return;
        }

        let message = reason.message();
        info!("Match over: {}", message);
        self.end_message = Some(message.clone());
        fx.push(Effect::Broadcast(PeerMessage::GameEnded {
            message: message.clone(),
        }));
        render(fx, RenderCommand::ShowEndScreen(message));
        fx.push(Effect::Cancel(TimerKind::AutoStart));
        fx.push(Effect::Schedule {
            after: Duration::from_millis(timing::SHUTDOWN_DELAY_MS),
            timer: TimerKind::Shutdown,
        });
    }

    fn teardown(&mut self, fx: &mut Effects) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        fx.push(Effect::Teardown);
    }

    /// A channel opened
    pub fn on_open(&mut self, peer: &str, now: Instant) -> Effects {
        if self.connections.insert(peer, now) {
            info!("Connection to {} open ({} total)", peer, self.connections.count());
        }
        Vec::new()
    }

    /// A channel closed or failed. Safe to call more than once per peer.
    pub fn on_closed(&mut self, peer: &str) -> Effects {
        let mut fx = Vec::new();
        if self.torn_down {
            return fx;
        }
        let had_connection = self.connections.remove(peer).is_some();
        if let Some(player) = self.state.roster.remove(peer) {
            info!("{} disconnected", player.name);
            render(&mut fx, RenderCommand::RemoveEntity(peer.to_string()));
        } else if had_connection {
            debug!("Connection to {} closed", peer);
        }

        if !self.is_host() && peer == self.host_id() {
            info!("Lost connection to host");
            if !self.lifecycle.is_ended() {
                let _ = self.lifecycle.end();
                let message = "Host left the game".to_string();
                self.end_message = Some(message.clone());
                render(&mut fx, RenderCommand::ShowEndScreen(message));
            }
            self.teardown(&mut fx);
        } else {
            self.check_end(&mut fx);
        }
        fx
    }

    /// Signaling dropped us; try once to get back
    pub fn on_signaling_lost(&mut self) -> Effects {
        if self.torn_down || self.signaling_retry_used {
            return Vec::new();
        }
        self.signaling_retry_used = true;
        warn!("Signaling lost, reconnecting once");
        vec![Effect::Schedule {
            after: Duration::from_millis(timing::SIGNALING_RECONNECT_MS),
            timer: TimerKind::SignalingReconnect,
        }]
    }

    /// A timer fired. Each timer re-checks whether it still applies.
    pub fn on_timer(&mut self, timer: TimerKind, now: Instant) -> Effects {
        if self.torn_down {
            return Vec::new();
        }
        match timer {
            TimerKind::AutoStart => {
                if !self.is_host() || !self.lifecycle.is_lobby() {
                    return Vec::new();
                }
                info!("Auto-starting match");
                self.start_game(now).unwrap_or_else(|e| {
                    warn!("Auto-start failed: {}", e);
                    Vec::new()
                })
            }
            TimerKind::BotRespawn(id) => {
                let dead_bot = self
                    .state
                    .roster
                    .get(&id)
                    .is_some_and(|p| p.is_bot() && !p.is_alive());
                if !self.is_host() || !self.lifecycle.in_progress() || !dead_bot {
                    return Vec::new();
                }
                let position = self.random_position(spawn::ARENA_HALF_EXTENT);
                self.handle(Origin::Local, PeerMessage::PlayerRespawned { id, position }, now)
            }
            TimerKind::SelfRespawn => {
                let dead = self.local_player().is_some_and(|p| !p.is_alive());
                if self.lifecycle.is_ended() || !dead {
                    return Vec::new();
                }
                let position = self.random_position(spawn::ARENA_HALF_EXTENT);
                let id = self.local_id.clone();
                self.handle(Origin::Local, PeerMessage::PlayerRespawned { id, position }, now)
            }
            TimerKind::Heartbeat => {
                if !self.is_host() || self.visibility != Visibility::Public || self.lifecycle.is_ended() {
                    return Vec::new();
                }
                vec![
                    Effect::Announce(self.lobby_entry()),
                    Effect::Schedule {
                        after: Duration::from_secs(matchmaking::HEARTBEAT_SECS),
                        timer: TimerKind::Heartbeat,
                    },
                ]
            }
            TimerKind::Shutdown => {
                let mut fx = Vec::new();
                self.teardown(&mut fx);
                fx
            }
            TimerKind::SignalingReconnect => vec![Effect::ReconnectSignaling],
        }
    }

    /// Effects for a freshly established session: directory registration
    /// and heartbeat when public, plus the optional auto-start.
    pub fn startup(&mut self, auto_start: Option<Duration>) -> Effects {
        let mut fx = Vec::new();
        if !self.is_host() {
            return fx;
        }
        if self.visibility == Visibility::Public {
            fx.push(Effect::Announce(self.lobby_entry()));
            fx.push(Effect::Schedule {
                after: Duration::from_secs(matchmaking::HEARTBEAT_SECS),
                timer: TimerKind::Heartbeat,
            });
        }
        if let Some(after) = auto_start {
            fx.push(Effect::Schedule {
                after,
                timer: TimerKind::AutoStart,
            });
        }
        fx
    }

    /// Add up to `count` bots
    pub fn seed_bots(&mut self, count: usize) -> Effects {
        let mut fx = Vec::new();
        for _ in 0..count {
            match self.add_bot() {
                Ok((_, more)) => fx.extend(more),
                Err(e) => {
                    debug!("Stopped seeding bots: {}", e);
                    break;
                }
            }
        }
        fx
    }

    pub fn add_bot(&mut self) -> Result<(PeerId, Effects), SessionError> {
        self.require_lobby_host()?;
        if self.is_full() {
            return Err(SessionError::RosterFull);
        }
        let id = format!("bot_{}", Uuid::new_v4().simple());
        let name = ai::generate_bot_name(&mut self.rng);
        let position = self.random_position(spawn::JOIN_HALF_EXTENT);
        let bot = Player::new_bot(id.clone(), name, position);
        let snapshot = PlayerSnapshot::from_player(&bot);
        self.state.roster.insert(bot);
        info!("Added bot {}", snapshot.name);

        Ok((
            id,
            vec![Effect::Broadcast(PeerMessage::PlayerJoined { player: snapshot })],
        ))
    }

    pub fn remove_bot(&mut self, id: &str) -> Result<Effects, SessionError> {
        self.require_lobby_host()?;
        if !self.state.roster.get(id).is_some_and(|p| p.is_bot()) {
            return Err(SessionError::UnknownBot);
        }
        self.state.roster.remove(id);
        info!("Removed bot {}", id);
        Ok(vec![
            Effect::Broadcast(PeerMessage::PlayerDisconnected { id: id.to_string() }),
            Effect::Cancel(TimerKind::BotRespawn(id.to_string())),
        ])
    }

    /// Host: Lobby -> InProgress, scattering everyone else across the arena
    pub fn start_game(&mut self, _now: Instant) -> Result<Effects, SessionError> {
        self.require_host()?;
        self.lifecycle.start()?;

        let others: Vec<PeerId> = self
            .state
            .roster
            .ordered()
            .into_iter()
            .filter(|p| p.id != self.local_id)
            .map(|p| p.id.clone())
            .collect();
        for id in &others {
            let position = self.random_position(spawn::ARENA_HALF_EXTENT);
            if let Some(player) = self.state.roster.get_mut(id) {
                player.position = position;
                player.target_position = None;
            }
        }

        let players = self.snapshots();
        info!("Match started with {} players", players.len());
        let mut fx = vec![Effect::Broadcast(PeerMessage::StartGame {
            players: players.clone(),
        })];
        fx.push(Effect::Cancel(TimerKind::AutoStart));
        for snapshot in players.into_iter().filter(|p| p.id != self.local_id) {
            render(&mut fx, RenderCommand::SpawnEntity(snapshot));
        }
        Ok(fx)
    }

    pub fn local_move(&mut self, position: Vec3, rotation: f32, now: Instant) -> Effects {
        if !self.local_player().is_some_and(|p| p.is_alive()) {
            return Vec::new();
        }
        let id = self.local_id.clone();
        self.handle(
            Origin::Local,
            PeerMessage::PlayerMove {
                id,
                position,
                rotation,
            },
            now,
        )
    }

    /// Fire the current weapon. A hit is claimed only if `target` is in range.
    pub fn local_fire(
        &mut self,
        direction: Vec3,
        target: Option<&str>,
        now: Instant,
    ) -> Result<Effects, FireBlocked> {
        let alive = self.local_player().is_some_and(|p| p.is_alive());
        let stats = self.loadout.try_fire(now, alive)?;
        let weapon = self.loadout.current();
        let id = self.local_id.clone();

        let mut fx = self.handle(
            Origin::Local,
            PeerMessage::PlayerShoot {
                id: id.clone(),
                direction: direction.normalize(),
                weapon,
            },
            now,
        );

        let in_range = match (self.local_player(), target.and_then(|t| self.state.roster.get(t))) {
            (Some(me), Some(victim)) => {
                victim.id != self.local_id
                    && victim.is_alive()
                    && me.position.distance_to(victim.position) <= stats.range
            }
            _ => false,
        };
        if let (true, Some(target_id)) = (in_range, target) {
            fx.extend(self.handle(
                Origin::Local,
                PeerMessage::PlayerHit {
                    id,
                    target_id: target_id.to_string(),
                    damage: stats.damage,
                },
                now,
            ));
        }
        Ok(fx)
    }

    pub fn switch_weapon(&mut self, kind: WeaponKind, now: Instant) -> bool {
        self.loadout.switch(kind, now)
    }

    pub fn reload(&mut self, now: Instant) -> bool {
        self.loadout.reload(now)
    }

    /// Pay for and place a structure, replicating it to everyone
    pub fn place_building(
        &mut self,
        kind: BuildingKind,
        position: Vec3,
        rotation: f32,
        now: Instant,
    ) -> Result<Effects, BuildError> {
        if !self.local_player().is_some_and(|p| p.is_alive()) {
            return Err(BuildError::Eliminated);
        }
        let needed = kind.cost();
        if needed > self.materials {
            return Err(BuildError::InsufficientMaterials {
                needed,
                available: self.materials,
            });
        }
        self.materials -= needed;
        self.next_building += 1;

        let building = Building {
            id: format!("{}-{}", self.local_id, self.next_building),
            kind,
            position,
            rotation,
            owner: self.local_id.clone(),
        };
        Ok(self.handle(Origin::Local, PeerMessage::BuildingPlaced { building }, now))
    }

    /// Leave the session. Idempotent.
    pub fn leave(&mut self) -> Effects {
        let mut fx = Vec::new();
        if self.torn_down {
            return fx;
        }
        if !self.lifecycle.is_ended() {
            fx.push(Effect::Broadcast(PeerMessage::PlayerDisconnected {
                id: self.local_id.clone(),
            }));
            let _ = self.lifecycle.end();
        }
        info!("Leaving session");
        self.teardown(&mut fx);
        fx
    }

    /// Simulation tick: bots on the host, interpolation of remote entities
    pub fn advance(&mut self, now: Instant, dt: f32) -> Effects {
        let mut fx = Vec::new();
        if self.torn_down {
            return fx;
        }

        if self.is_host() && self.lifecycle.in_progress() {
            let messages = ai::update_bots(&mut self.state.roster, now, dt, &mut self.rng);
            for message in messages {
                fx.extend(self.handle(Origin::Local, message, now));
            }
        }

        let skip_bots = self.is_host();
        for player in self.state.roster.iter_mut() {
            if player.id == self.local_id || (skip_bots && player.is_bot()) || !player.is_alive() {
                continue;
            }
            let Some(target) = player.target_position else {
                continue;
            };
            player.position.x +=
                (target.x - player.position.x + interpolation::BIAS) * interpolation::FACTOR;
            player.position.z +=
                (target.z - player.position.z + interpolation::BIAS) * interpolation::FACTOR;
            player.rotation = player.target_rotation.unwrap_or(0.0);
            render(
                &mut fx,
                RenderCommand::UpdateTransform {
                    id: player.id.clone(),
                    position: player.position,
                    rotation: player.rotation,
                },
            );
        }
        fx
    }
}
