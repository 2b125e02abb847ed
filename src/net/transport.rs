//! Peer transport abstraction
//!
//! A transport owns the local peer identity and one reliable, ordered channel
//! per remote peer. Everything it observes is reported on an event channel:
//! each connection yields at most one [`TransportEvent::Open`], any number of
//! [`TransportEvent::Data`], then exactly one `Closed` or `Error`.

use std::future::Future;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::game::state::PeerId;
use crate::net::protocol::PeerMessage;

/// Something a transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel to `peer` is usable, inbound or outbound
    Open(PeerId),
    Data(PeerId, PeerMessage),
    /// Terminal: the channel closed cleanly
    Closed(PeerId),
    /// Terminal: the channel failed or could not be opened
    Error(PeerId, TransportError),
    /// Lost the signaling service. Open channels keep working.
    SignalingLost,
}

impl TransportEvent {
    pub fn peer(&self) -> Option<&str> {
        match self {
            TransportEvent::Open(p)
            | TransportEvent::Data(p, _)
            | TransportEvent::Closed(p)
            | TransportEvent::Error(p, _) => Some(p),
            TransportEvent::SignalingLost => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed(_) | TransportEvent::Error(_, _))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Peer {0} is unavailable")]
    PeerUnavailable(PeerId),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Signaling server error: {0}")]
    ServerError(String),
    #[error("Transport not supported here: {0}")]
    Incompatible(String),
    #[error("Not connected to {0}")]
    NotConnected(PeerId),
    #[error("Transport destroyed")]
    Destroyed,
}

/// Failure to obtain a local identity
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("Signaling unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),
}

/// Live peer transport.
///
/// Calls never block; results that need the network arrive as events.
pub trait Transport: Send {
    /// Identity other peers use to reach this one
    fn local_id(&self) -> &str;

    /// Start opening a channel. Success is an `Open` event, failure an `Error`.
    fn connect(&mut self, peer: &str) -> Result<(), TransportError>;

    fn send(&mut self, peer: &str, message: &PeerMessage) -> Result<(), TransportError>;

    /// Close one channel. No-op if it is already gone.
    fn close(&mut self, peer: &str);

    /// Peers with an open channel
    fn peers(&self) -> Vec<PeerId>;

    /// Close every channel and release the local identity. Idempotent.
    fn destroy(&mut self);

    fn is_destroyed(&self) -> bool;

    /// Single attempt to re-reach the signaling service
    fn reconnect_signaling(&mut self) -> Result<(), SignalingError>;

    /// Send to every open channel. Returns the peers that were reached.
    fn broadcast(&mut self, message: &PeerMessage) -> Vec<PeerId> {
        let mut delivered = Vec::new();
        for peer in self.peers() {
            match self.send(&peer, message) {
                Ok(()) => delivered.push(peer),
                Err(e) => tracing::warn!("Broadcast to {} failed: {}", peer, e),
            }
        }
        delivered
    }

    /// Send to every open channel except `exclude`
    fn broadcast_except(&mut self, message: &PeerMessage, exclude: &str) -> Vec<PeerId> {
        let mut delivered = Vec::new();
        for peer in self.peers().into_iter().filter(|p| p != exclude) {
            match self.send(&peer, message) {
                Ok(()) => delivered.push(peer),
                Err(e) => tracing::warn!("Broadcast to {} failed: {}", peer, e),
            }
        }
        delivered
    }
}

/// A transport together with the stream of its events
pub type OpenedTransport = (Box<dyn Transport>, UnboundedReceiver<TransportEvent>);

/// Issues local identities and the transports that carry them
pub trait Signaling: Send + Sync {
    fn open(&self) -> impl Future<Output = Result<OpenedTransport, SignalingError>> + Send;
}
