//! Peer identity → live connection map.
//!
//! Each identity maps to at most one connection. A second handshake for the
//! same identity replaces the entry and closes the superseded connection.
//! Every lookup-then-send happens inside one critical section so a send never
//! reaches a connection that was already evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use metrics::{counter, gauge};
use onebridge_core::{Event, PeerId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionId, PeerConnection, SendOutcome};
use crate::handshake::{HandshakeError, await_handshake};
use crate::metrics::{HANDSHAKE_FAILURES_TOTAL, OUTBOUND_DROPS_TOTAL, PEERS_ACTIVE, PEERS_REPLACED_TOTAL};

/// Transmit seam used by the correlator.
#[cfg_attr(test, mockall::automock)]
pub trait PeerSender: Send + Sync {
    /// Deliver one text frame to `peer`. `false` if it was not accepted.
    fn send_frame(&self, peer: PeerId, frame: Arc<String>) -> bool;
}

/// Registry of bound peers.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: Mutex<HashMap<PeerId, Arc<PeerConnection>>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the handshake on `frames`, then bind the connection.
    ///
    /// Returns the bound identity and the handshake event, which the caller
    /// still owes to the handlers. On failure the connection is closed and
    /// nothing is registered.
    pub async fn accept<S>(
        &self,
        conn: Arc<PeerConnection>,
        frames: &mut S,
        window: Duration,
    ) -> Result<(PeerId, Event), HandshakeError>
    where
        S: Stream<Item = String> + Unpin,
    {
        match await_handshake(frames, window).await {
            Ok(event) => {
                let peer = event.self_id();
                let _ = self.bind(peer, conn);
                Ok((peer, event))
            }
            Err(err) => {
                warn!(conn_id = %conn.id(), reason = err.reason(), error = %err, "handshake failed");
                counter!(HANDSHAKE_FAILURES_TOTAL, "reason" => err.reason()).increment(1);
                conn.close();
                Err(err)
            }
        }
    }

    /// Register `conn` under `peer`, closing any connection it replaces.
    pub fn bind(&self, peer: PeerId, conn: Arc<PeerConnection>) -> Option<Arc<PeerConnection>> {
        let conn_id = conn.id();
        let replaced = {
            let mut peers = self.peers.lock();
            let replaced = peers.insert(peer, conn);
            gauge!(PEERS_ACTIVE).set(peers.len() as f64);
            replaced
        };

        match &replaced {
            Some(old) if old.id() != conn_id => {
                info!(%peer, %conn_id, old_conn_id = %old.id(), "peer reconnected, closing previous connection");
                counter!(PEERS_REPLACED_TOTAL).increment(1);
                old.close();
            }
            _ => info!(%peer, %conn_id, "peer bound"),
        }
        replaced
    }

    /// Queue `frame` for `peer`.
    ///
    /// A closed writer evicts the peer. A full queue drops the frame and
    /// keeps the peer.
    pub fn send(&self, peer: PeerId, frame: Arc<String>) -> bool {
        let mut peers = self.peers.lock();
        let Some(conn) = peers.get(&peer) else {
            debug!(%peer, "send to unknown peer");
            return false;
        };

        match conn.send(frame) {
            SendOutcome::Queued => true,
            SendOutcome::Full => {
                warn!(%peer, conn_id = %conn.id(), "outbound queue full, dropping frame");
                counter!(OUTBOUND_DROPS_TOTAL).increment(1);
                false
            }
            SendOutcome::Closed => {
                warn!(%peer, conn_id = %conn.id(), "connection closed, evicting peer");
                counter!(OUTBOUND_DROPS_TOTAL).increment(1);
                if let Some(conn) = peers.remove(&peer) {
                    conn.close();
                }
                gauge!(PEERS_ACTIVE).set(peers.len() as f64);
                false
            }
        }
    }

    /// Queue `frame` for every bound peer. `true` only if all accepted it.
    pub fn broadcast(&self, frame: Arc<String>) -> bool {
        let targets = self.peers();
        let mut all_ok = true;
        for peer in targets {
            if !self.send(peer, frame.clone()) {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Remove and close `peer`'s connection.
    pub fn disconnect(&self, peer: PeerId) -> bool {
        let removed = {
            let mut peers = self.peers.lock();
            let removed = peers.remove(&peer);
            gauge!(PEERS_ACTIVE).set(peers.len() as f64);
            removed
        };
        if let Some(conn) = removed {
            info!(%peer, conn_id = %conn.id(), "peer disconnected");
            conn.close();
            true
        } else {
            warn!(%peer, "disconnect for unknown peer");
            false
        }
    }

    /// Remove `peer` only if it is still bound to `conn_id`.
    ///
    /// Used by a connection's own teardown so it cannot evict a successor.
    pub fn release(&self, peer: PeerId, conn_id: ConnectionId) -> bool {
        let mut peers = self.peers.lock();
        if peers.get(&peer).is_some_and(|c| c.id() == conn_id) {
            let _ = peers.remove(&peer);
            gauge!(PEERS_ACTIVE).set(peers.len() as f64);
            debug!(%peer, %conn_id, "peer released");
            true
        } else {
            false
        }
    }

    /// Close every connection and clear the map.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut peers = self.peers.lock();
            let drained = peers.drain().collect();
            gauge!(PEERS_ACTIVE).set(0.0);
            drained
        };
        for (_, conn) in &drained {
            conn.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all peers");
        }
        drained.len()
    }

    /// Connection currently bound to `peer`.
    pub fn get(&self, peer: PeerId) -> Option<Arc<PeerConnection>> {
        self.peers.lock().get(&peer).cloned()
    }

    /// Whether `peer` is bound.
    pub fn contains(&self, peer: PeerId) -> bool {
        self.peers.lock().contains_key(&peer)
    }

    /// Bound identities, sorted.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.peers.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Whether no identity is bound.
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}

impl PeerSender for ConnectionRegistry {
    fn send_frame(&self, peer: PeerId, frame: Arc<String>) -> bool {
        self.send(peer, frame)
    }
}
