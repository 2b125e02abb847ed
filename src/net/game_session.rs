//! Session runtime
//!
//! Owns one [`Session`] and drives it from a single task: transport events,
//! local commands, due timers and the simulation tick are all serialised
//! through one `select!` loop, so the session itself needs no locking.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::constants::timing;
use crate::game::lifecycle::GamePhase;
use crate::game::state::{BuildingKind, PeerId};
use crate::game::weapons::WeaponKind;
use crate::lobby::directory::Directory;
use crate::lobby::matchmaking::Established;
use crate::metrics::Metrics;
use crate::net::reducer::{Effect, Origin};
use crate::net::session::{Session, Visibility};
use crate::net::timers::Scheduler;
use crate::net::transport::{Transport, TransportEvent};
use crate::render::{self, Renderer};
use crate::util::vec3::Vec3;

/// How long teardown waits for the directory to acknowledge an unregister
const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(2);

/// Actions from the local player or the host's lobby UI
#[derive(Debug, Clone)]
pub enum LocalCommand {
    Move { position: Vec3, rotation: f32 },
    Fire { direction: Vec3, target: Option<PeerId> },
    SwitchWeapon(WeaponKind),
    Reload,
    PlaceBuilding { kind: BuildingKind, position: Vec3, rotation: f32 },
    AddBot,
    RemoveBot(PeerId),
    Start,
    Leave,
}

/// Cloneable handle for feeding commands into a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: UnboundedSender<LocalCommand>,
}

impl SessionHandle {
    /// Returns false once the session has stopped
    pub fn send(&self, command: LocalCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn start(&self) -> bool {
        self.send(LocalCommand::Start)
    }

    pub fn leave(&self) -> bool {
        self.send(LocalCommand::Leave)
    }
}

/// What a finished session leaves behind
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub local_id: PeerId,
    pub was_host: bool,
    pub phase: GamePhase,
    pub end_message: Option<String>,
}

enum Wake {
    Command(Option<LocalCommand>),
    Event(Option<TransportEvent>),
    Timers,
    Tick,
}

pub struct SessionRuntime<R: Renderer, D: Directory> {
    session: Session,
    transport: Box<dyn Transport>,
    events: UnboundedReceiver<TransportEvent>,
    commands: UnboundedReceiver<LocalCommand>,
    renderer: R,
    directory: Option<Arc<D>>,
    scheduler: Scheduler,
    metrics: Arc<Metrics>,
    pending: Vec<Effect>,
    last_phase: GamePhase,
    /// Most recent directory registration, if one was started
    announce: Option<JoinHandle<()>>,
}

impl<R: Renderer, D: Directory> SessionRuntime<R, D> {
    pub fn new(
        established: Established,
        renderer: R,
        directory: Option<Arc<D>>,
        metrics: Arc<Metrics>,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let last_phase = established.session.phase();
        let runtime = Self {
            session: established.session,
            transport: established.transport,
            events: established.events,
            commands: rx,
            renderer,
            directory,
            scheduler: Scheduler::new(),
            metrics,
            pending: established.effects,
            last_phase,
            announce: None,
        };
        (runtime, SessionHandle { commands: tx })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session until it tears down
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            "Session running as {} ({})",
            self.session.local_id(),
            if self.session.is_host() { "host" } else { "client" }
        );

        let mut ticker = interval(Duration::from_millis(timing::TICK_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();
        let mut commands_open = true;

        let initial = std::mem::take(&mut self.pending);
        let mut stop = self.execute(initial);

        while !stop {
            let deadline = self
                .scheduler
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let wake = tokio::select! {
                command = self.commands.recv(), if commands_open => Wake::Command(command),
                event = self.events.recv() => Wake::Event(event),
                _ = sleep_until(deadline) => Wake::Timers,
                _ = ticker.tick() => Wake::Tick,
            };

            let now = Instant::now();
            let effects = match wake {
                Wake::Command(Some(command)) => self.on_command(command, now),
                Wake::Command(None) => {
                    commands_open = false;
                    Vec::new()
                }
                Wake::Event(Some(event)) => self.on_event(event, now),
                Wake::Event(None) => {
                    warn!("Transport event stream ended");
                    self.session.leave()
                }
                Wake::Timers => {
                    let mut effects = Vec::new();
                    for timer in self.scheduler.pop_due(now) {
                        debug!("Timer {:?} fired", timer);
                        effects.extend(self.session.on_timer(timer, now));
                    }
                    effects
                }
                Wake::Tick => {
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    self.session.advance(now, dt)
                }
            };
            stop = self.execute(effects);
        }

        self.finish().await
    }

    fn on_command(&mut self, command: LocalCommand, now: Instant) -> Vec<Effect> {
        match command {
            LocalCommand::Move { position, rotation } => self.session.local_move(position, rotation, now),
            LocalCommand::Fire { direction, target } => self
                .session
                .local_fire(direction, target.as_deref(), now)
                .unwrap_or_else(|blocked| {
                    debug!("Shot blocked: {}", blocked);
                    Vec::new()
                }),
            LocalCommand::SwitchWeapon(kind) => {
                if !self.session.switch_weapon(kind, now) {
                    debug!("Cannot switch weapons while reloading");
                }
                Vec::new()
            }
            LocalCommand::Reload => {
                self.session.reload(now);
                Vec::new()
            }
            LocalCommand::PlaceBuilding {
                kind,
                position,
                rotation,
            } => self
                .session
                .place_building(kind, position, rotation, now)
                .unwrap_or_else(|e| {
                    info!("Cannot build: {}", e);
                    Vec::new()
                }),
            LocalCommand::AddBot => match self.session.add_bot() {
                Ok((_, effects)) => effects,
                Err(e) => {
                    warn!("Cannot add bot: {}", e);
                    Vec::new()
                }
            },
            LocalCommand::RemoveBot(id) => self.session.remove_bot(&id).unwrap_or_else(|e| {
                warn!("Cannot remove bot {}: {}", id, e);
                Vec::new()
            }),
            LocalCommand::Start => self.session.start_game(now).unwrap_or_else(|e| {
                warn!("Cannot start: {}", e);
                Vec::new()
            }),
            LocalCommand::Leave => self.session.leave(),
        }
    }

    fn on_event(&mut self, event: TransportEvent, now: Instant) -> Vec<Effect> {
        match event {
            TransportEvent::Open(peer) => self.session.on_open(&peer, now),
            TransportEvent::Data(peer, message) => {
                self.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                debug!("{} from {}", message.kind(), peer);
                self.session.handle(Origin::Remote(peer), message, now)
            }
            TransportEvent::Closed(peer) => self.session.on_closed(&peer),
            TransportEvent::Error(peer, e) => {
                warn!("Connection to {} failed: {}", peer, e);
                self.session.on_closed(&peer)
            }
            TransportEvent::SignalingLost => self.session.on_signaling_lost(),
        }
    }

    /// Carry out effects in order. Returns true when the session must stop.
    fn execute(&mut self, effects: Vec<Effect>) -> bool {
        let mut stop = false;
        for effect in effects {
            match effect {
                Effect::Send { to, message } => match self.transport.send(&to, &message) {
                    Ok(()) => self.delivered(std::slice::from_ref(&to)),
                    Err(e) => {
                        self.metrics.send_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("Send {} to {} failed: {}", message.kind(), to, e);
                    }
                },
                Effect::Broadcast(message) => {
                    let reached = self.transport.broadcast(&message);
                    self.delivered(&reached);
                }
                Effect::BroadcastExcept { message, except } => {
                    let reached = self.transport.broadcast_except(&message, &except);
                    self.delivered(&reached);
                }
                Effect::Disconnect(peer) => self.transport.close(&peer),
                Effect::Render(command) => render::apply(&mut self.renderer, &command),
                Effect::Schedule { after, timer } => {
                    self.scheduler.schedule(Instant::now() + after, timer);
                }
                Effect::Cancel(timer) => {
                    self.scheduler.cancel_kind(&timer);
                }
                Effect::Announce(entry) => {
                    if let Some(directory) = &self.directory {
                        let directory = directory.clone();
                        // Registrations land in order, each after the one before
                        let previous = self.announce.take();
                        self.announce = Some(tokio::spawn(async move {
                            if let Some(previous) = previous {
                                let _ = previous.await;
                            }
                            if let Err(e) = directory.register(&entry).await {
                                warn!("Lobby registration failed: {}", e);
                            }
                        }));
                    }
                }
                Effect::ReconnectSignaling => match self.transport.reconnect_signaling() {
                    Ok(()) => info!("Signaling reconnected"),
                    Err(e) => warn!("Signaling reconnect failed: {}", e),
                },
                Effect::Teardown => stop = true,
            }
        }
        self.observe();
        stop
    }

    fn delivered(&mut self, peers: &[PeerId]) {
        self.metrics
            .messages_sent
            .fetch_add(peers.len() as u64, Ordering::Relaxed);
        for peer in peers {
            self.session.record_sent(peer);
        }
    }

    /// Keep gauges and phase counters in step with the session
    fn observe(&mut self) {
        self.metrics
            .connections_active
            .store(self.session.connections().count() as u64, Ordering::Relaxed);
        self.metrics
            .roster_size
            .store(self.session.roster().len() as u64, Ordering::Relaxed);

        let phase = self.session.phase();
        if phase != self.last_phase {
            match phase {
                GamePhase::InProgress => {
                    self.metrics.matches_started.fetch_add(1, Ordering::Relaxed);
                }
                GamePhase::Ended => {
                    self.metrics.matches_ended.fetch_add(1, Ordering::Relaxed);
                }
                GamePhase::Lobby => {}
            }
            info!("Phase {:?} -> {:?}", self.last_phase, phase);
            self.last_phase = phase;
        }
    }

    async fn finish(mut self) -> SessionOutcome {
        // An in-flight registration must not land after the unregister
        if let Some(mut announce) = self.announce.take() {
            if tokio::time::timeout(UNREGISTER_TIMEOUT, &mut announce).await.is_err() {
                warn!("Lobby registration still pending, abandoning it");
                announce.abort();
            }
        }

        let listed = self.session.is_host() && self.session.visibility() == Visibility::Public;
        if let (true, Some(directory)) = (listed, &self.directory) {
            match tokio::time::timeout(UNREGISTER_TIMEOUT, directory.unregister(self.session.local_id())).await {
                Ok(Ok(())) => debug!("Lobby unregistered"),
                Ok(Err(e)) => warn!("Lobby unregistration failed: {}", e),
                Err(_) => warn!("Lobby unregistration timed out"),
            }
        }

        self.transport.destroy();
        self.scheduler.clear();
        self.metrics.connections_active.store(0, Ordering::Relaxed);

        let outcome = SessionOutcome {
            local_id: self.session.local_id().to_string(),
            was_host: self.session.is_host(),
            phase: self.session.phase(),
            end_message: self.session.end_message().map(str::to_string),
        };
        info!(
            "Session {} over: {}",
            outcome.local_id,
            outcome.end_message.as_deref().unwrap_or("left")
        );
        outcome
    }
}
