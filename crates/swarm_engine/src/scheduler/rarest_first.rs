use std::net::SocketAddr;

use rand::seq::IndexedRandom;
use swarm_wire::{MsgType, Packet};

use super::push::DefaultPush;
use super::{Ctx, Outbound, Scheduler};

/// Window behind/ahead of the newest owned chunk scanned for missing chunks.
const WINDOW_BEHIND: u32 = 50;
const WINDOW_AHEAD: u32 = 10;
/// How many of the rarest missing chunks get a REQUEST per tick.
const TOP_K: usize = 5;

/// Inherits `DefaultPush`'s flood behavior and additionally pulls the scarcest
/// missing chunks in its local window, prioritizing chunks few peers hold.
#[derive(Debug, Default)]
pub struct RarestFirst {
    push: DefaultPush,
}

impl RarestFirst {
    pub fn new() -> Self {
        RarestFirst::default()
    }
}

impl Scheduler for RarestFirst {
    fn on_chunk_received(&mut self, chunk_id: u32, payload: &[u8], from: SocketAddr, ctx: &mut Ctx) {
        self.push.on_chunk_received(chunk_id, payload, from, ctx);
    }

    fn on_tick(&mut self, ctx: &mut Ctx) {
        self.push.on_tick(ctx);

        let Some(&max_owned) = ctx.store.local_bitmap().iter().next_back() else {
            return;
        };
        let window_start = max_owned.saturating_sub(WINDOW_BEHIND);
        let window_end = max_owned.saturating_add(WINDOW_AHEAD);

        // (owner_count, chunk_id, owners) for every missing chunk with at least one owner.
        let mut candidates: Vec<(usize, u32, Vec<SocketAddr>)> = Vec::new();
        for chunk_id in window_start..=window_end {
            if ctx.store.local_bitmap().contains(&chunk_id) {
                continue;
            }
            let owners: Vec<SocketAddr> = ctx
                .peers
                .active()
                .filter(|p| p.remote_bitmap.contains(&chunk_id))
                .map(|p| p.addr)
                .collect();
            if !owners.is_empty() {
                candidates.push((owners.len(), chunk_id, owners));
            }
        }
        candidates.sort_by_key(|(count, chunk_id, _)| (*count, *chunk_id));

        let mut rng = rand::rng();
        for (_, chunk_id, owners) in candidates.into_iter().take(TOP_K) {
            if let Some(&owner) = owners.choose(&mut rng) {
                ctx.outbox.push(Outbound::request(owner, chunk_id));
            }
        }
    }

    fn handle_packet(&mut self, pkt: &Packet, from: SocketAddr, _ctx: &mut Ctx) -> bool {
        intercept_request(&mut self.push, pkt, from)
    }
}

/// Shared by `RarestFirst` and `Edf`: a REQUEST from a peer satisfies any pending
/// push to that same peer for the same chunk, so drop it from the push queue.
pub(super) fn intercept_request(push: &mut DefaultPush, pkt: &Packet, from: SocketAddr) -> bool {
    if pkt.msg_type == MsgType::Request
        && let Some(chunk_id) = swarm_wire::request::decode(&pkt.payload)
    {
        push.remove_pending_target(chunk_id, from);
    }
    false
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

    #[test]
    fn requests_rarest_missing_chunks_in_window() {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        peers.touch(addr(1), None, now);
        peers.touch(addr(2), None, now);
        // chunk 10 is rare (one owner), chunk 11 is common (two owners).
        peers.update_bitmap(addr(1), [10, 11].into_iter().collect(), now);
        peers.update_bitmap(addr(2), [11].into_iter().collect(), now);

        let mut store = ChunkStore::new();
        store.insert(5, vec![0]);

        let mut scheduler = RarestFirst::new();
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
            .filter(|o| o.msg_type == MsgType::Request)
            .map(|o| swarm_wire::request::decode(&o.payload).unwrap())
            .collect();
        assert!(requested.contains(&10));
        // the rarer chunk (1 owner) must be requested before the more common one (2 owners)
        let pos_10 = requested.iter().position(|&c| c == 10).unwrap();
        let pos_11 = requested.iter().position(|&c| c == 11);
        if let Some(pos_11) = pos_11 {
            assert!(pos_10 < pos_11);
        }
    }

    #[test]
    fn pull_dedup_prevents_duplicate_send() {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        peers.touch(addr(1), None, now);
        peers.touch(addr(2), None, now);
        let store = ChunkStore::new();

        let mut scheduler = RarestFirst::new();
        {
            let mut outbox = Vec::new();
            let mut ctx = Ctx {
                self_addr: addr(0),
                peers: &peers,
                store: &store,
                outbox: &mut outbox,
            };
            scheduler.on_chunk_received(3, b"x", addr(1), &mut ctx);
        }
        assert!(scheduler.push.pending_targets(3).unwrap().contains(&addr(2)));

        let req = Packet::new(MsgType::Request, 0, 0.0, swarm_wire::request::encode(3));
        let mut outbox = Vec::new();
        let mut ctx = Ctx {
            self_addr: addr(0),
            peers: &peers,
            store: &store,
            outbox: &mut outbox,
        };
        let handled = scheduler.handle_packet(&req, addr(2), &mut ctx);
        assert!(!handled, "default REQUEST handling must still run");
        assert!(scheduler.push.pending_targets(3).is_none());
    }
}
