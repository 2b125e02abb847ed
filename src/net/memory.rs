//! In-process peer network
//!
//! Used for offline sessions and for tests. Messages still go through the JSON
//! codec so both ends see exactly what a real wire would carry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::state::PeerId;
use crate::net::protocol::{self, PeerMessage};
use crate::net::transport::{
    OpenedTransport, Signaling, SignalingError, Transport, TransportError, TransportEvent,
};

struct PeerSlot {
    events: UnboundedSender<TransportEvent>,
    links: HashSet<PeerId>,
}

#[derive(Default)]
struct NetworkInner {
    peers: HashMap<PeerId, PeerSlot>,
    /// Identities signaling can currently route connects to
    signaled: HashSet<PeerId>,
    /// Signaling refuses new identities
    offline: bool,
    /// Peers that never answer a connect
    stalled: HashSet<PeerId>,
}

impl NetworkInner {
    fn emit(&self, peer: &str, event: TransportEvent) {
        if let Some(slot) = self.peers.get(peer) {
            // Receiver gone means the owner stopped listening
            let _ = slot.events.send(event);
        }
    }

    fn unlink(&mut self, a: &str, b: &str) -> bool {
        let had = self
            .peers
            .get_mut(a)
            .map(|slot| slot.links.remove(b))
            .unwrap_or(false);
        if let Some(slot) = self.peers.get_mut(b) {
            slot.links.remove(a);
        }
        had
    }
}

/// Shared in-process network; clone freely
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` fail
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Let connects to `peer` hang forever
    pub fn stall(&self, peer: &str) {
        self.inner.lock().stalled.insert(peer.to_string());
    }

    /// Identities currently registered
    pub fn peer_count(&self) -> usize {
        self.inner.lock().peers.len()
    }

    /// Whether signaling currently knows `peer`
    pub fn is_registered(&self, peer: &str) -> bool {
        self.inner.lock().signaled.contains(peer)
    }

    /// Signaling forgets `peer`. Its open channels keep working, but nobody
    /// can reach it and it cannot dial out until it reconnects.
    pub fn drop_signaling(&self, peer: &str) {
        let mut inner = self.inner.lock();
        if inner.signaled.remove(peer) {
            debug!("Signaling dropped {}", peer);
            inner.emit(peer, TransportEvent::SignalingLost);
        }
    }

    /// Register a transport under a chosen id
    pub fn open_as(&self, id: &str) -> Result<OpenedTransport, SignalingError> {
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(SignalingError::Unavailable("network is offline".into()));
        }
        if inner.peers.contains_key(id) || inner.signaled.contains(id) {
            return Err(SignalingError::Unavailable(format!("id {} is taken", id)));
        }
        inner.signaled.insert(id.to_string());

        let (tx, rx) = mpsc::unbounded_channel();
        inner.peers.insert(
            id.to_string(),
            PeerSlot {
                events: tx,
                links: HashSet::new(),
            },
        );
        debug!("Memory peer {} registered", id);

        let transport = MemoryTransport {
            network: self.clone(),
            local_id: id.to_string(),
            destroyed: false,
        };
        Ok((Box::new(transport), rx))
    }
}

impl Signaling for MemoryNetwork {
    async fn open(&self) -> Result<OpenedTransport, SignalingError> {
        let id = Uuid::new_v4().simple().to_string();
        self.open_as(&id)
    }
}

/// One identity on a [`MemoryNetwork`]
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_id: PeerId,
    destroyed: bool,
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> &str {
        &self.local_id
    }

    fn connect(&mut self, peer: &str) -> Result<(), TransportError> {
        if self.destroyed {
            return Err(TransportError::Destroyed);
        }
        let mut inner = self.network.inner.lock();
        if inner.stalled.contains(peer) {
            debug!("Connect {} -> {} stalled", self.local_id, peer);
            return Ok(());
        }
        if !inner.signaled.contains(&self.local_id) {
            inner.emit(
                &self.local_id,
                TransportEvent::Error(
                    peer.to_string(),
                    TransportError::ServerError("not connected to signaling".into()),
                ),
            );
            return Ok(());
        }
        if peer == self.local_id || !inner.signaled.contains(peer) {
            inner.emit(
                &self.local_id,
                TransportEvent::Error(peer.to_string(), TransportError::PeerUnavailable(peer.to_string())),
            );
            return Ok(());
        }

        if let Some(slot) = inner.peers.get_mut(&self.local_id) {
            slot.links.insert(peer.to_string());
        }
        if let Some(slot) = inner.peers.get_mut(peer) {
            slot.links.insert(self.local_id.clone());
        }
        inner.emit(peer, TransportEvent::Open(self.local_id.clone()));
        inner.emit(&self.local_id, TransportEvent::Open(peer.to_string()));
        Ok(())
    }

    fn send(&mut self, peer: &str, message: &PeerMessage) -> Result<(), TransportError> {
        if self.destroyed {
            return Err(TransportError::Destroyed);
        }
        let inner = self.network.inner.lock();
        let linked = inner
            .peers
            .get(&self.local_id)
            .is_some_and(|slot| slot.links.contains(peer));
        if !linked {
            return Err(TransportError::NotConnected(peer.to_string()));
        }

        let bytes = protocol::encode(message).map_err(|e| TransportError::Network(e.to_string()))?;
        match protocol::decode(&bytes) {
            Ok(decoded) => inner.emit(peer, TransportEvent::Data(self.local_id.clone(), decoded)),
            Err(e) => warn!("Dropping undecodable message to {}: {}", peer, e),
        }
        Ok(())
    }

    fn close(&mut self, peer: &str) {
        let mut inner = self.network.inner.lock();
        if inner.unlink(&self.local_id, peer) {
            inner.emit(&self.local_id, TransportEvent::Closed(peer.to_string()));
            inner.emit(peer, TransportEvent::Closed(self.local_id.clone()));
        }
    }

    fn peers(&self) -> Vec<PeerId> {
        let inner = self.network.inner.lock();
        let mut peers: Vec<PeerId> = inner
            .peers
            .get(&self.local_id)
            .map(|slot| slot.links.iter().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let mut inner = self.network.inner.lock();
        let links: Vec<PeerId> = inner
            .peers
            .get(&self.local_id)
            .map(|slot| slot.links.iter().cloned().collect())
            .unwrap_or_default();
        for peer in links {
            inner.unlink(&self.local_id, &peer);
            inner.emit(&peer, TransportEvent::Closed(self.local_id.clone()));
        }
        inner.peers.remove(&self.local_id);
        inner.signaled.remove(&self.local_id);
        debug!("Memory peer {} destroyed", self.local_id);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn reconnect_signaling(&mut self) -> Result<(), SignalingError> {
        if self.destroyed {
            return Err(SignalingError::Unavailable("transport destroyed".into()));
        }
        let mut inner = self.network.inner.lock();
        if inner.offline {
            return Err(SignalingError::Unavailable("network is offline".into()));
        }
        if !inner.signaled.insert(self.local_id.clone()) {
            debug!("{} is still registered with signaling", self.local_id);
        }
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}
