use std::collections::BTreeSet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use swarm_core::Role;

use crate::peer::Peer;

/// At most one `Peer` per `(host, port)` endpoint. Owned exclusively by the node's
/// single logical task; no internal locking.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, Peer>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable {
            peers: HashMap::new(),
        }
    }

    /// Create-if-absent; update `last_seen`; optionally set role.
    pub fn touch(&mut self, addr: SocketAddr, role: Option<Role>, now: Instant) -> &mut Peer {
        let peer = self
            .peers
            .entry(addr)
            .or_insert_with(|| Peer::new(addr, now));
        peer.touch(now);
        if let Some(role) = role {
            peer.role = Some(role);
        }
        peer
    }

    /// Replace a peer's remote bitmap wholesale; create the peer if absent.
    pub fn update_bitmap(&mut self, addr: SocketAddr, set: BTreeSet<u32>, now: Instant) {
        let peer = self
            .peers
            .entry(addr)
            .or_insert_with(|| Peer::new(addr, now));
        peer.remote_bitmap = set;
    }

    pub fn update_rtt(&mut self, addr: SocketAddr, sample: Duration) {
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.update_rtt(sample);
        }
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Peer> {
        self.peers.get(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    /// All currently known peers. Freshness is enforced by the periodic `prune` loop,
    /// not by this accessor.
    pub fn active(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn active_addrs(&self) -> Vec<SocketAddr> {
        self.peers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn broadcaster(&self) -> Option<&Peer> {
        self.peers.values().find(|p| p.is_broadcaster())
    }

    /// Remove peers whose `last_seen` is older than `timeout`; return their addresses.
    pub fn prune(&mut self, now: Instant, timeout: Duration) -> Vec<SocketAddr> {
        let stale: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_seen) > timeout)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &stale {
            self.peers.remove(addr);
        }
        stale
    }
}
