use std::net::SocketAddr;

use itertools::Itertools;
use rand::Rng;
use rand::seq::IndexedRandom;

use super::{Ctx, Outbound, Scheduler};

/// Default broadcaster-backoff probability: the chance a broadcaster-only chunk is
/// skipped this tick to give P2P propagation a chance.
pub const DEFAULT_BACKOFF_PROBABILITY: f64 = 0.3;
/// A more conservative alternate backoff, skewing harder toward skipping.
pub const CONSERVATIVE_BACKOFF_PROBABILITY: f64 = 0.9;

/// How many candidate chunks (out of `available`, newest-first) get a REQUEST
/// decision per tick.
const MAX_CANDIDATES_PER_TICK: usize = 100;

/// Viewer-only pull scheduler from the alternate scheduler taxonomy. Never combined
/// with the push-based family on the same node. Does no flooding of its own: chunks
/// arrive only via REQUEST.
#[derive(Debug)]
pub struct LegacyPull {
    backoff_probability: f64,
}

impl LegacyPull {
    pub fn new(backoff_probability: f64) -> Self {
        LegacyPull {
            backoff_probability,
        }
    }
}

impl Default for LegacyPull {
    fn default() -> Self {
        LegacyPull::new(DEFAULT_BACKOFF_PROBABILITY)
    }
}

impl Scheduler for LegacyPull {
    fn on_tick(&mut self, ctx: &mut Ctx) {
        let local = ctx.store.local_bitmap();
        let available: Vec<u32> = ctx
            .peers
            .active()
            .flat_map(|p| p.remote_bitmap.iter().copied())
            .filter(|id| !local.contains(id))
            .unique()
            .sorted_unstable()
            .rev() // latency-first: newest chunks first
            .take(MAX_CANDIDATES_PER_TICK)
            .collect();

        let mut rng = rand::rng();
        for chunk_id in available {
            let mut viewer_owners = Vec::new();
            let mut broadcaster_owners = Vec::new();
            for peer in ctx.peers.active() {
                if !peer.remote_bitmap.contains(&chunk_id) {
                    continue;
                }
                if peer.is_broadcaster() {
                    broadcaster_owners.push(peer.addr);
                } else {
                    viewer_owners.push(peer.addr);
                }
            }

            let target = if let Some(&viewer) = viewer_owners.choose(&mut rng) {
                Some(viewer)
            } else if !broadcaster_owners.is_empty() {
                if rng.random_bool(self.backoff_probability) {
                    // Broadcaster backoff: skip this tick, give P2P time to catch up.
                    None
                } else {
                    broadcaster_owners.choose(&mut rng).copied()
                }
            } else {
                None
            };

            if let Some(target) = target {
                ctx.outbox.push(Outbound::request(target, chunk_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer_table::PeerTable;
    use crate::store::ChunkStore;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;
    use swarm_core::Role;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn prefers_viewer_owners_over_broadcaster() {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        peers.touch(addr(1), Some(Role::Broadcaster), now);
        peers.touch(addr(2), Some(Role::Viewer), now);
        peers.update_bitmap(addr(1), [500].into_iter().collect(), now);
        peers.update_bitmap(addr(2), [500].into_iter().collect(), now);

        let store = ChunkStore::new();
        let mut scheduler = LegacyPull::new(0.0); // no backoff, deterministic
        let mut outbox = Vec::new();
        let mut ctx = Ctx {
            self_addr: addr(0),
            peers: &peers,
            store: &store,
            outbox: &mut outbox,
        };
        scheduler.on_tick(&mut ctx);

        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, addr(2));
    }

    #[test]
    fn broadcaster_backoff_skews_toward_skipping() {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        peers.touch(addr(1), Some(Role::Broadcaster), now);
        peers.update_bitmap(addr(1), [500].into_iter().collect(), now);

        let store = ChunkStore::new();
        let mut scheduler = LegacyPull::new(CONSERVATIVE_BACKOFF_PROBABILITY);

        let mut requested = 0;
        for _ in 0..100 {
            let mut outbox = Vec::new();
            let mut ctx = Ctx {
                self_addr: addr(0),
                peers: &peers,
                store: &store,
                outbox: &mut outbox,
            };
            scheduler.on_tick(&mut ctx);
            requested += outbox.len();
        }
        // expected ~10 (100 * (1 - 0.9)); allow generous slack for a probabilistic test.
        assert!((1..=30).contains(&requested), "got {requested}");
    }

    #[test]
    fn never_requests_already_owned_chunks() {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        peers.touch(addr(1), Some(Role::Viewer), now);
        peers.update_bitmap(addr(1), [1, 2, 3].into_iter().collect(), now);

        let mut store = ChunkStore::new();
        store.insert(2, vec![0]);

        let mut scheduler = LegacyPull::new(0.0);
        let mut outbox = Vec::new();
        let mut ctx = Ctx {
            self_addr: addr(0),
            peers: &peers,
            store: &store,
            outbox: &mut outbox,
        };
        scheduler.on_tick(&mut ctx);

        let requested: Vec<u32> = outbox
            .iter()
            .map(|o| swarm_wire::request::decode(&o.payload).unwrap())
            .collect();
        assert!(!requested.contains(&2));
        assert!(requested.contains(&1));
        assert!(requested.contains(&3));
    }
}
