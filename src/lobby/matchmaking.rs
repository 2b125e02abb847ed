//! Matchmaking
//!
//! One "Play" press walks a fixed fallback chain:
//!
//! 1. list fresh lobbies from the directory
//! 2. try to join each one in listing order, one at a time
//! 3. otherwise host a public session (registered, seeded with bots)
//! 4. if signaling is down, host an offline session on an in-process network
//!
//! Every join attempt gets its own transport, and a failed attempt's transport
//! is destroyed before the next candidate is tried.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::game::constants::matchmaking;
use crate::game::state::PeerId;
use crate::lobby::directory::{list_fresh, Directory};
use crate::net::memory::MemoryNetwork;
use crate::net::protocol::{PeerMessage, PlayerSnapshot};
use crate::net::reducer::{Effect, Origin};
use crate::net::session::{Session, Visibility};
use crate::net::transport::{Signaling, SignalingError, Transport, TransportError, TransportEvent};

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Host did not answer in time")]
    Timeout,
    #[error("Host closed the connection")]
    Closed,
}

/// How the session came about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    Joined { host: PeerId },
    Hosted(Visibility),
}

/// A session ready to run, with the effects its setup produced
pub struct Established {
    pub session: Session,
    pub transport: Box<dyn Transport>,
    pub events: UnboundedReceiver<TransportEvent>,
    pub kind: MatchKind,
    /// Lobbies tried before this one, in order
    pub attempted: Vec<PeerId>,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    pub player_name: String,
    pub join_timeout: Duration,
    pub freshness_secs: i64,
    pub public_bots: usize,
    pub public_autostart: Duration,
    pub offline_bots: usize,
    pub offline_autostart: Duration,
    /// Fixed RNG seed for reproducible sessions
    pub seed: Option<u64>,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            player_name: "Player".to_string(),
            join_timeout: Duration::from_secs(matchmaking::JOIN_TIMEOUT_SECS),
            freshness_secs: matchmaking::LOBBY_FRESHNESS_SECS,
            public_bots: matchmaking::PUBLIC_BOTS,
            public_autostart: Duration::from_secs(matchmaking::PUBLIC_AUTOSTART_SECS),
            offline_bots: matchmaking::OFFLINE_BOTS,
            offline_autostart: Duration::from_secs(matchmaking::OFFLINE_AUTOSTART_SECS),
            seed: None,
        }
    }
}

impl From<&ClientConfig> for MatchmakerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            player_name: config.player_name.clone(),
            public_bots: config.public_bots,
            offline_bots: config.offline_bots,
            ..Self::default()
        }
    }
}

pub struct Matchmaker<S: Signaling, D: Directory> {
    signaling: S,
    directory: Arc<D>,
    config: MatchmakerConfig,
}

impl<S: Signaling, D: Directory> Matchmaker<S, D> {
    pub fn new(signaling: S, directory: Arc<D>, config: MatchmakerConfig) -> Self {
        Self {
            signaling,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &MatchmakerConfig {
        &self.config
    }

    /// Run the full fallback chain. Only fails if even the offline network
    /// cannot hand out an identity.
    pub async fn play(&self) -> Result<Established, SignalingError> {
        let lobbies = list_fresh(self.directory.as_ref(), self.config.freshness_secs).await;
        info!("Found {} joinable lobbies", lobbies.len());

        let mut attempted = Vec::new();
        for lobby in &lobbies {
            attempted.push(lobby.peer_id.clone());
            info!("Trying {}'s lobby ({})", lobby.host_name, lobby.peer_id);
            match self.try_join(&lobby.peer_id).await {
                Ok(mut established) => {
                    established.attempted = attempted;
                    return Ok(established);
                }
                Err(e) => info!("Could not join {}: {}", lobby.peer_id, e),
            }
        }

        let mut established = match self.signaling.open().await {
            Ok((transport, events)) => {
                info!("No lobby available, hosting a public session");
                self.establish_host(
                    transport,
                    events,
                    Visibility::Public,
                    self.config.public_bots,
                    Some(self.config.public_autostart),
                )
            }
            Err(e) => {
                warn!("Signaling unavailable ({}), starting an offline session", e);
                self.host_offline().await?
            }
        };
        established.attempted = attempted;
        Ok(established)
    }

    /// Join a specific host, bypassing the directory
    pub async fn join_direct(&self, host: &str) -> Result<Established, JoinError> {
        let mut established = self.try_join(host).await?;
        established.attempted = vec![host.to_string()];
        Ok(established)
    }

    /// Host an unlisted session that others join by id
    pub async fn host_private(&self) -> Result<Established, SignalingError> {
        let (transport, events) = self.signaling.open().await?;
        Ok(self.establish_host(transport, events, Visibility::Private, 0, None))
    }

    /// Host on a fresh in-process network; nobody else can reach it
    pub async fn host_offline(&self) -> Result<Established, SignalingError> {
        let network = MemoryNetwork::new();
        let (transport, events) = network.open().await?;
        Ok(self.establish_host(
            transport,
            events,
            Visibility::Offline,
            self.config.offline_bots,
            Some(self.config.offline_autostart),
        ))
    }

    fn establish_host(
        &self,
        transport: Box<dyn Transport>,
        events: UnboundedReceiver<TransportEvent>,
        visibility: Visibility,
        bots: usize,
        auto_start: Option<Duration>,
    ) -> Established {
        let mut session = Session::host(
            transport.local_id().to_string(),
            self.config.player_name.clone(),
            visibility,
            self.config.seed,
        );
        let mut effects = session.seed_bots(bots);
        effects.extend(session.startup(auto_start));
        info!(
            "Hosting {:?} session as {} with {} bots",
            visibility,
            session.local_id(),
            bots
        );

        Established {
            session,
            transport,
            events,
            kind: MatchKind::Hosted(visibility),
            attempted: Vec::new(),
            effects,
        }
    }

    /// One bounded join attempt on a fresh transport
    async fn try_join(&self, host: &str) -> Result<Established, JoinError> {
        let (mut transport, mut events) = self.signaling.open().await?;
        let mut session = Session::client(
            transport.local_id().to_string(),
            self.config.player_name.clone(),
            host.to_string(),
            self.config.seed,
        );
        let join = match session.local_player() {
            Some(me) => PeerMessage::Join {
                player: PlayerSnapshot::from_player(me),
            },
            None => return Err(JoinError::Closed),
        };

        let outcome = timeout(
            self.config.join_timeout,
            handshake(&mut *transport, &mut events, host, join),
        )
        .await;
        let players = match outcome {
            Ok(Ok(players)) => players,
            Ok(Err(e)) => {
                transport.destroy();
                return Err(e);
            }
            Err(_) => {
                transport.destroy();
                return Err(JoinError::Timeout);
            }
        };

        let now = Instant::now();
        let mut effects = session.on_open(host, now);
        effects.extend(session.handle(
            Origin::Remote(host.to_string()),
            PeerMessage::Players { players },
            now,
        ));
        info!(
            "Joined {} with {} players",
            host,
            session.roster().len()
        );

        Ok(Established {
            session,
            transport,
            events,
            kind: MatchKind::Joined {
                host: host.to_string(),
            },
            attempted: Vec::new(),
            effects,
        })
    }
}

/// Open a channel to `host`, introduce ourselves, and wait for the roster
async fn handshake(
    transport: &mut dyn Transport,
    events: &mut UnboundedReceiver<TransportEvent>,
    host: &str,
    join: PeerMessage,
) -> Result<Vec<PlayerSnapshot>, JoinError> {
    transport.connect(host)?;

    loop {
        match events.recv().await {
            Some(TransportEvent::Open(peer)) if peer == host => break,
            Some(TransportEvent::Error(peer, e)) if peer == host => return Err(JoinError::Transport(e)),
            Some(TransportEvent::Closed(peer)) if peer == host => return Err(JoinError::Closed),
            Some(other) => debug!("Ignoring {:?} while connecting", other),
            None => return Err(JoinError::Closed),
        }
    }

    transport.send(host, &join)?;

    loop {
        match events.recv().await {
            Some(TransportEvent::Data(peer, PeerMessage::Players { players })) if peer == host => {
                return Ok(players)
            }
            Some(TransportEvent::Error(peer, e)) if peer == host => return Err(JoinError::Transport(e)),
            Some(TransportEvent::Closed(peer)) if peer == host => return Err(JoinError::Closed),
            Some(other) => debug!("Ignoring {:?} while joining", other),
            None => return Err(JoinError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lifecycle::GamePhase;
    use crate::lobby::directory::{now_millis, InMemoryDirectory, LobbyRecord};
    use crate::net::timers::TimerKind;

    fn lobby(id: &str, age_secs: i64) -> LobbyRecord {
        LobbyRecord {
            peer_id: id.into(),
            host_name: format!("Host {}", id),
            player_count: 1,
            max_players: 10,
            timestamp: now_millis() - age_secs * 1000,
        }
    }

    fn config() -> MatchmakerConfig {
        MatchmakerConfig {
            player_name: "Luna".into(),
            seed: Some(11),
            ..MatchmakerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_lobbies_hosts_public() {
        let network = MemoryNetwork::new();
        let directory = Arc::new(InMemoryDirectory::new());
        let matchmaker = Matchmaker::new(network.clone(), directory, config());

        let established = matchmaker.play().await.unwrap();
        assert_eq!(established.kind, MatchKind::Hosted(Visibility::Public));
        assert_eq!(established.session.roster().len(), 4);
        assert_eq!(established.session.roster().bot_count(), 3);
        assert!(established.effects.iter().any(|e| matches!(e, Effect::Announce(_))));
        assert!(established.effects.contains(&Effect::Schedule {
            after: Duration::from_secs(15),
            timer: TimerKind::AutoStart
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signaling_down_goes_offline() {
        let network = MemoryNetwork::new();
        network.set_offline(true);
        let directory = Arc::new(InMemoryDirectory::new());
        directory.set_unavailable(true);
        let matchmaker = Matchmaker::new(network, directory, config());

        let established = matchmaker.play().await.unwrap();
        assert_eq!(established.kind, MatchKind::Hosted(Visibility::Offline));
        assert_eq!(established.session.roster().bot_count(), 5);
        assert!(!established.effects.iter().any(|e| matches!(e, Effect::Announce(_))));
        assert!(established.effects.contains(&Effect::Schedule {
            after: Duration::from_secs(3),
            timer: TimerKind::AutoStart
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lobbies_are_skipped() {
        let network = MemoryNetwork::new();
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert(lobby("ancient", 121));
        let matchmaker = Matchmaker::new(network, directory, config());

        let established = matchmaker.play().await.unwrap();
        assert!(established.attempted.is_empty());
        assert!(matches!(established.kind, MatchKind::Hosted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_host_fails_fast() {
        let network = MemoryNetwork::new();
        let matchmaker = Matchmaker::new(network.clone(), Arc::new(InMemoryDirectory::new()), config());

        let started = Instant::now();
        let result = matchmaker.join_direct("ghost").await;
        assert!(matches!(
            result,
            Err(JoinError::Transport(TransportError::PeerUnavailable(_)))
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(network.peer_count(), 0);
    }

    /// Answers exactly one join on `id` with a one-player roster
    fn stand_in_host(network: &MemoryNetwork, id: &str) -> tokio::task::JoinHandle<Box<dyn Transport>> {
        let (mut host, mut host_rx) = network.open_as(id).unwrap();
        let id = id.to_string();
        tokio::spawn(async move {
            let joiner = match host_rx.recv().await {
                Some(TransportEvent::Open(peer)) => peer,
                other => panic!("unexpected {:?}", other),
            };
            assert!(matches!(
                host_rx.recv().await,
                Some(TransportEvent::Data(_, PeerMessage::Join { .. }))
            ));
            let players = vec![PlayerSnapshot {
                id,
                name: "Nova".into(),
                position: Default::default(),
                rotation: 0.0,
                health: 100,
                is_bot: false,
            }];
            host.send(&joiner, &PeerMessage::Players { players }).unwrap();
            host
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_direct_reads_roster() {
        let network = MemoryNetwork::new();
        let answer = stand_in_host(&network, "h");
        let matchmaker = Matchmaker::new(network.clone(), Arc::new(InMemoryDirectory::new()), config());

        let established = matchmaker.join_direct("h").await.unwrap();
        let _host = answer.await.unwrap();
        assert_eq!(established.kind, MatchKind::Joined { host: "h".into() });
        assert_eq!(established.session.roster().len(), 2);
        assert_eq!(established.session.phase(), GamePhase::Lobby);
        assert!(established.session.connections().contains("h"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tries_lobbies_in_order_until_one_answers() {
        let network = MemoryNetwork::new();
        let directory = Arc::new(InMemoryDirectory::new());
        for id in ["a", "b", "c", "d"] {
            directory.insert(lobby(id, 10));
        }
        network.stall("b");
        let answer = stand_in_host(&network, "c");
        let matchmaker = Matchmaker::new(network.clone(), directory, config());

        let started = Instant::now();
        let established = matchmaker.play().await.unwrap();
        let _host = answer.await.unwrap();

        assert_eq!(established.kind, MatchKind::Joined { host: "c".into() });
        assert_eq!(established.attempted, vec!["a", "b", "c"]);
        assert!(started.elapsed() >= Duration::from_secs(5));
        // Failed attempts released their identities: only "c" and the joiner remain
        assert_eq!(network.peer_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_lobbies_time_out_then_host() {
        let network = MemoryNetwork::new();
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert(lobby("x", 5));
        directory.insert(lobby("y", 5));
        network.stall("x");
        network.stall("y");
        let matchmaker = Matchmaker::new(network.clone(), directory, config());

        let started = Instant::now();
        let established = matchmaker.play().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(established.attempted, vec!["x", "y"]);
        assert_eq!(established.kind, MatchKind::Hosted(Visibility::Public));
        assert_eq!(network.peer_count(), 1);
    }
}
