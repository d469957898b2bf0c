use std::net::SocketAddr;

use rand::seq::IndexedRandom;
use swarm_wire::Packet;

use super::push::DefaultPush;
use super::rarest_first::intercept_request;
use super::{Ctx, Outbound, Scheduler};

const WINDOW_BEHIND: u32 = 50;
const WINDOW_AHEAD: u32 = 10;

/// Inherits `DefaultPush`'s flood behavior; each tick requests only the single
/// earliest-deadline missing chunk in its window that some peer owns.
#[derive(Debug, Default)]
pub struct Edf {
    push: DefaultPush,
}

impl Edf {
    pub fn new() -> Self {
        Edf::default()
    }
}

impl Scheduler for Edf {
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

        let mut rng = rand::rng();
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
            if let Some(&owner) = owners.choose(&mut rng) {
                ctx.outbox.push(Outbound::request(owner, chunk_id));
                return;
            }
        }
    }

    fn handle_packet(&mut self, pkt: &Packet, from: SocketAddr, _ctx: &mut Ctx) -> bool {
        intercept_request(&mut self.push, pkt, from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer_table::PeerTable;
    use crate::store::ChunkStore;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;
    use swarm_wire::MsgType;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn requests_only_the_earliest_missing_chunk() {
        let mut peers = PeerTable::new();
        let now = Instant::now();
        peers.touch(addr(1), None, now);
        peers.update_bitmap(addr(1), [10, 12].into_iter().collect(), now);

        let mut store = ChunkStore::new();
        store.insert(5, vec![0]);

        let mut scheduler = Edf::new();
        let mut outbox = Vec::new();
        let mut ctx = Ctx {
            self_addr: addr(0),
            peers: &peers,
            store: &store,
            outbox: &mut outbox,
        };
        scheduler.on_tick(&mut ctx);

        let requests: Vec<_> = outbox
            .iter()
            .filter(|o| o.msg_type == MsgType::Request)
            .collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            swarm_wire::request::decode(&requests[0].payload),
            Some(10)
        );
    }
}
