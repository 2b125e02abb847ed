//! TCP peer transport
//!
//! A peer's identity is the socket address it listens on. The dialing side
//! opens with a [`Hello`](crate::net::framing::Hello) frame carrying its own
//! identity so the listener knows where replies belong; after that both
//! directions carry length-prefixed JSON [`PeerMessage`]s.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::state::PeerId;
use crate::net::framing::{self, FramingError};
use crate::net::protocol::PeerMessage;
use crate::net::transport::{
    OpenedTransport, Signaling, SignalingError, Transport, TransportError, TransportEvent,
};

/// How long an inbound stream may take to introduce itself
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive accept failures before the listener is abandoned
const MAX_ACCEPT_FAILURES: u32 = 8;

/// Hands out TCP transports listening on `bind`
#[derive(Debug, Clone)]
pub struct TcpSignaling {
    bind: SocketAddr,
}

impl TcpSignaling {
    /// Port 0 picks a free port per transport
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind }
    }
}

impl TcpSignaling {
    async fn open_tcp(&self) -> Result<(TcpTransport, UnboundedReceiver<TransportEvent>), SignalingError> {
        let listener = TcpListener::bind(self.bind).await?;
        let local_id = listener.local_addr()?.to_string();
        let (events, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            local_id: local_id.clone(),
            links: Mutex::new(HashMap::new()),
            events,
            next_generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        });
        let acceptor = tokio::spawn(accept_loop(listener, shared.clone()));
        info!("TCP transport listening as {}", local_id);

        Ok((
            TcpTransport {
                shared,
                acceptor: Some(acceptor),
            },
            rx,
        ))
    }
}

impl Signaling for TcpSignaling {
    async fn open(&self) -> Result<OpenedTransport, SignalingError> {
        let (transport, rx) = self.open_tcp().await?;
        Ok((Box::new(transport), rx))
    }
}

/// Listen again on the address that is this peer's identity
fn rebind(local_id: &str) -> Result<TcpListener, SignalingError> {
    let addr: SocketAddr = local_id
        .parse()
        .map_err(|_| SignalingError::Unavailable(format!("{} is not a socket address", local_id)))?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(1024)?)
}

struct Link {
    outbound: UnboundedSender<PeerMessage>,
    reader: JoinHandle<()>,
    generation: u64,
}

struct Shared {
    local_id: PeerId,
    links: Mutex<HashMap<PeerId, Link>>,
    events: UnboundedSender<TransportEvent>,
    next_generation: AtomicU64,
    destroyed: AtomicBool,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Remove the link only if it is still the one `generation` created
    fn remove_link(&self, peer: &str, generation: u64) -> bool {
        let mut links = self.links.lock();
        match links.get(peer) {
            Some(link) if link.generation == generation => {
                links.remove(peer);
                true
            }
            _ => false,
        }
    }
}

/// Wire up reader and writer tasks for an established stream
fn attach(shared: &Arc<Shared>, peer: PeerId, stream: TcpStream) {
    if shared.is_destroyed() {
        return;
    }
    let (mut read_half, mut write_half) = stream.into_split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<PeerMessage>();
    let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed);

    {
        let mut links = shared.links.lock();
        if links.contains_key(&peer) {
            warn!("Duplicate channel from {}, dropping the new one", peer);
            return;
        }

        let reader_shared = shared.clone();
        let reader_peer = peer.clone();
        let reader = tokio::spawn(async move {
            let terminal = loop {
                match framing::read_peer_message(&mut read_half).await {
                    Ok(message) => {
                        reader_shared.emit(TransportEvent::Data(reader_peer.clone(), message))
                    }
                    Err(FramingError::Malformed(e)) => {
                        warn!("Undecodable frame from {}: {}", reader_peer, e);
                    }
                    Err(FramingError::ConnectionClosed) => {
                        break TransportEvent::Closed(reader_peer.clone());
                    }
                    Err(e) => {
                        break TransportEvent::Error(
                            reader_peer.clone(),
                            TransportError::Network(e.to_string()),
                        );
                    }
                }
            };
            if reader_shared.remove_link(&reader_peer, generation) {
                reader_shared.emit(terminal);
            }
        });

        links.insert(
            peer.clone(),
            Link {
                outbound,
                reader,
                generation,
            },
        );
    }

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = framing::write_peer_message(&mut write_half, &message).await {
                debug!("Write to {} failed: {}", writer_peer, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    shared.emit(TransportEvent::Open(peer));
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut failures = 0;
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(accepted) => {
                failures = 0;
                accepted
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                failures += 1;
                if failures >= MAX_ACCEPT_FAILURES {
                    break;
                }
                continue;
            }
        };
        let shared = shared.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HELLO_TIMEOUT, framing::read_hello(&mut stream)).await {
                Ok(Ok(hello)) => {
                    debug!("Inbound channel from {} ({})", hello.peer_id, addr);
                    attach(&shared, hello.peer_id, stream);
                }
                Ok(Err(e)) => warn!("Bad handshake from {}: {}", addr, e),
                Err(_) => warn!("Handshake from {} timed out", addr),
            }
        });
    }

    // Nobody can reach us until the listener is rebound
    drop(listener);
    if !shared.is_destroyed() {
        warn!("Listener for {} abandoned", shared.local_id);
        shared.emit(TransportEvent::SignalingLost);
    }
}

/// Transport over plain TCP streams
pub struct TcpTransport {
    shared: Arc<Shared>,
    acceptor: Option<JoinHandle<()>>,
}

impl Transport for TcpTransport {
    fn local_id(&self) -> &str {
        &self.shared.local_id
    }

    fn connect(&mut self, peer: &str) -> Result<(), TransportError> {
        if self.shared.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        let peer = peer.to_string();
        let addr: SocketAddr = match peer.parse() {
            Ok(addr) => addr,
            Err(_) => {
                self.shared.emit(TransportEvent::Error(
                    peer.clone(),
                    TransportError::PeerUnavailable(peer),
                ));
                return Ok(());
            }
        };

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut stream = match TcpStream::connect(addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("Connect to {} failed: {}", peer, e);
                    shared.emit(TransportEvent::Error(
                        peer.clone(),
                        TransportError::PeerUnavailable(peer),
                    ));
                    return;
                }
            };
            if let Err(e) = framing::write_hello(&mut stream, &shared.local_id).await {
                shared.emit(TransportEvent::Error(
                    peer,
                    TransportError::Network(e.to_string()),
                ));
                return;
            }
            attach(&shared, peer, stream);
        });
        Ok(())
    }

    fn send(&mut self, peer: &str, message: &PeerMessage) -> Result<(), TransportError> {
        if self.shared.is_destroyed() {
            return Err(TransportError::Destroyed);
        }
        let links = self.shared.links.lock();
        let link = links
            .get(peer)
            .ok_or_else(|| TransportError::NotConnected(peer.to_string()))?;
        link.outbound
            .send(message.clone())
            .map_err(|_| TransportError::NotConnected(peer.to_string()))
    }

    fn close(&mut self, peer: &str) {
        let removed = self.shared.links.lock().remove(peer);
        if let Some(link) = removed {
            link.reader.abort();
            // Dropping the sender lets the writer flush and shut down
            drop(link.outbound);
            self.shared.emit(TransportEvent::Closed(peer.to_string()));
        }
    }

    fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.shared.links.lock().keys().cloned().collect();
        peers.sort();
        peers
    }

    fn destroy(&mut self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        for peer in self.peers() {
            self.close(&peer);
        }
        info!("TCP transport {} destroyed", self.shared.local_id);
    }

    fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }

    fn reconnect_signaling(&mut self) -> Result<(), SignalingError> {
        if self.shared.is_destroyed() {
            return Err(SignalingError::Unavailable("transport destroyed".into()));
        }
        if self.acceptor.as_ref().is_some_and(|acceptor| !acceptor.is_finished()) {
            debug!("{} is still listening", self.shared.local_id);
            return Ok(());
        }
        let listener = rebind(&self.shared.local_id)?;
        self.acceptor = Some(tokio::spawn(accept_loop(listener, self.shared.clone())));
        info!("TCP transport {} listening again", self.shared.local_id);
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback() -> TcpSignaling {
        TcpSignaling::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }

    async fn next(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_connect_send_close() {
        let signaling = loopback();
        let (mut host, mut host_rx) = signaling.open().await.unwrap();
        let (mut client, mut client_rx) = signaling.open().await.unwrap();
        let host_id = host.local_id().to_string();
        let client_id = client.local_id().to_string();

        client.connect(&host_id).unwrap();
        assert_eq!(next(&mut client_rx).await, TransportEvent::Open(host_id.clone()));
        assert_eq!(next(&mut host_rx).await, TransportEvent::Open(client_id.clone()));

        let msg = PeerMessage::PlayerDisconnected { id: client_id.clone() };
        client.send(&host_id, &msg).unwrap();
        assert_eq!(
            next(&mut host_rx).await,
            TransportEvent::Data(client_id.clone(), msg.clone())
        );

        host.send(&client_id, &msg).unwrap();
        assert_eq!(next(&mut client_rx).await, TransportEvent::Data(host_id.clone(), msg));

        client.close(&host_id);
        assert_eq!(next(&mut client_rx).await, TransportEvent::Closed(host_id.clone()));
        assert_eq!(next(&mut host_rx).await, TransportEvent::Closed(client_id));
        assert!(host.peers().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let signaling = loopback();
        let (mut a, mut a_rx) = signaling.open().await.unwrap();

        a.connect("not an address").unwrap();
        assert!(matches!(
            next(&mut a_rx).await,
            TransportEvent::Error(_, TransportError::PeerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_closes_remote() {
        let signaling = loopback();
        let (mut host, mut host_rx) = signaling.open().await.unwrap();
        let (mut client, mut client_rx) = signaling.open().await.unwrap();
        let host_id = host.local_id().to_string();

        client.connect(&host_id).unwrap();
        next(&mut client_rx).await;
        next(&mut host_rx).await;

        host.destroy();
        host.destroy();
        assert!(host.is_destroyed());
        assert_eq!(next(&mut client_rx).await, TransportEvent::Closed(host_id));
    }

    #[tokio::test]
    async fn test_reconnect_rebinds_listener() {
        let (mut host, mut host_rx) = loopback().open_tcp().await.unwrap();
        let host_id = host.local_id().to_string();
        host.reconnect_signaling().unwrap();

        let acceptor = host.acceptor.take().unwrap();
        acceptor.abort();
        let _ = acceptor.await;

        host.reconnect_signaling().unwrap();
        let (mut client, mut client_rx) = loopback().open().await.unwrap();
        client.connect(&host_id).unwrap();
        assert_eq!(next(&mut client_rx).await, TransportEvent::Open(host_id));
        assert!(matches!(next(&mut host_rx).await, TransportEvent::Open(_)));
    }

    #[tokio::test]
    async fn test_reconnect_fails_when_address_taken() {
        let (mut host, _host_rx) = loopback().open_tcp().await.unwrap();
        let addr: SocketAddr = host.local_id().parse().unwrap();

        let acceptor = host.acceptor.take().unwrap();
        acceptor.abort();
        let _ = acceptor.await;

        let _squatter = std::net::TcpListener::bind(addr).unwrap();
        assert!(matches!(host.reconnect_signaling(), Err(SignalingError::Bind(_))));
    }
}
