use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;

use super::{Ctx, Outbound, Scheduler};

/// How many send actions `on_tick` performs per call.
const DRAIN_BATCH: usize = 5;

#[derive(Debug)]
struct PendingEntry {
    payload: Vec<u8>,
    targets: VecDeque<SocketAddr>,
}

/// Flood-push scheduler. On receiving a new chunk, queues it to every active peer
/// except the sender; drains a bounded number of sends per tick, giving
/// deduplicated breadth-first flooding at a receiver-controlled rate.
#[derive(Debug, Default)]
pub struct DefaultPush {
    pending_push: BTreeMap<u32, PendingEntry>,
}

impl DefaultPush {
    pub fn new() -> Self {
        DefaultPush::default()
    }

    /// Drop `target` from `chunk_id`'s pending push list, since the DATA response to
    /// its REQUEST will satisfy it too. Shared by `RarestFirst` and `Edf`, which
    /// compose a `DefaultPush` for their flood behavior.
    pub(super) fn remove_pending_target(&mut self, chunk_id: u32, target: SocketAddr) {
        if let Some(entry) = self.pending_push.get_mut(&chunk_id) {
            entry.targets.retain(|&t| t != target);
            if entry.targets.is_empty() {
                self.pending_push.remove(&chunk_id);
            }
        }
    }

    pub(super) fn pending_targets(&self, chunk_id: u32) -> Option<&VecDeque<SocketAddr>> {
        self.pending_push.get(&chunk_id).map(|e| &e.targets)
    }
}

impl Scheduler for DefaultPush {
    fn on_chunk_received(&mut self, chunk_id: u32, payload: &[u8], from: SocketAddr, ctx: &mut Ctx) {
        let mut targets: Vec<SocketAddr> = ctx
            .peers
            .active_addrs()
            .into_iter()
            .filter(|&a| a != from)
            .collect();
        if targets.is_empty() {
            return;
        }
        targets.sort();
        self.pending_push.insert(
            chunk_id,
            PendingEntry {
                payload: payload.to_vec(),
                targets: targets.into(),
            },
        );
    }

    fn on_tick(&mut self, ctx: &mut Ctx) {
        let mut sent = 0usize;
        let mut drained = Vec::new();
        for (&chunk_id, entry) in self.pending_push.iter_mut() {
            if sent >= DRAIN_BATCH {
                break;
            }
            if let Some(target) = entry.targets.pop_front() {
                ctx.outbox
                    .push(Outbound::data(target, chunk_id, entry.payload.clone()));
                sent += 1;
            }
            if entry.targets.is_empty() {
                drained.push(chunk_id);
            }
        }
        for chunk_id in drained {
            self.pending_push.remove(&chunk_id);
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

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn peers_with(ports: &[u16]) -> PeerTable {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        for &p in ports {
            peers.touch(addr(p), None, now);
        }
        peers
    }

    #[test]
    fn floods_to_all_peers_except_sender() {
        let peers = peers_with(&[1, 2, 3]);
        let store = ChunkStore::new();
        let mut push = DefaultPush::new();
        let mut outbox = Vec::new();
        {
            let mut ctx = Ctx {
                self_addr: addr(0),
                peers: &peers,
                store: &store,
                outbox: &mut outbox,
            };
            push.on_chunk_received(7, b"payload", addr(1), &mut ctx);
        }
        assert!(outbox.is_empty(), "flood is queued, not sent immediately");

        let mut outbox = Vec::new();
        let mut ctx = Ctx {
            self_addr: addr(0),
            peers: &peers,
            store: &store,
            outbox: &mut outbox,
        };
        push.on_tick(&mut ctx);
        let targets: Vec<_> = outbox.iter().map(|o| o.to).collect();
        assert_eq!(targets, vec![addr(2), addr(3)]);
    }

    #[test]
    fn drains_at_most_five_sends_per_tick() {
        let ports: Vec<u16> = (1..=20).collect();
        let peers = peers_with(&ports);
        let store = ChunkStore::new();
        let mut push = DefaultPush::new();

        {
            let mut outbox = Vec::new();
            let mut ctx = Ctx {
                self_addr: addr(0),
                peers: &peers,
                store: &store,
                outbox: &mut outbox,
            };
            push.on_chunk_received(1, b"x", addr(1), &mut ctx);
        }

        let mut outbox = Vec::new();
        let mut ctx = Ctx {
            self_addr: addr(0),
            peers: &peers,
            store: &store,
            outbox: &mut outbox,
        };
        push.on_tick(&mut ctx);
        assert_eq!(outbox.len(), 5);
    }

    #[test]
    fn pull_dedup_removes_target_from_pending_list() {
        let peers = peers_with(&[1, 2, 3]);
        let store = ChunkStore::new();
        let mut push = DefaultPush::new();
        {
            let mut outbox = Vec::new();
            let mut ctx = Ctx {
                self_addr: addr(0),
                peers: &peers,
                store: &store,
                outbox: &mut outbox,
            };
            push.on_chunk_received(5, b"x", addr(1), &mut ctx);
        }
        assert!(push.pending_targets(5).unwrap().contains(&addr(2)));
        push.remove_pending_target(5, addr(2));
        assert!(!push.pending_targets(5).unwrap().contains(&addr(2)));
    }
}
