use super::{Ctx, Outbound, Scheduler};

/// Broadcaster-only round-robin distributor. Every generated chunk is unicast to
/// exactly one peer; the broadcaster never floods, and load is spread evenly over
/// the active peer set modulo cursor rotation.
#[derive(Debug, Default)]
pub struct Splitter {
    cursor: usize,
}

impl Splitter {
    pub fn new() -> Self {
        Splitter::default()
    }
}

impl Scheduler for Splitter {
    fn on_chunk_generated(&mut self, chunk_id: u32, payload: &[u8], ctx: &mut Ctx) {
        let mut addrs = ctx.peers.active_addrs();
        if addrs.is_empty() {
            // No peers yet: the chunk stays in the local store only.
            return;
        }
        addrs.sort();

        self.cursor %= addrs.len();
        let target = addrs[self.cursor];
        ctx.outbox
            .push(Outbound::data(target, chunk_id, payload.to_vec()));
        self.cursor = (self.cursor + 1) % addrs.len();
    }
}
