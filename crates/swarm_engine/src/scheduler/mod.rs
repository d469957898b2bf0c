mod edf;
mod legacy_pull;
mod push;
mod rarest_first;
mod splitter;

use std::net::SocketAddr;

use swarm_wire::{MsgType, Packet};

use crate::peer_table::PeerTable;
use crate::store::ChunkStore;

pub use edf::Edf;
pub use legacy_pull::{CONSERVATIVE_BACKOFF_PROBABILITY, DEFAULT_BACKOFF_PROBABILITY, LegacyPull};
pub use push::DefaultPush;
pub use rarest_first::RarestFirst;
pub use splitter::Splitter;

/// A send a scheduler wants the node to perform. Schedulers never touch the socket
/// directly; they queue `Outbound`s and the node stamps/sends them, which keeps the
/// scheduling logic pure and unit-testable without real sockets.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: SocketAddr,
    pub msg_type: MsgType,
    pub seq: u32,
    pub payload: Vec<u8>,
}

impl Outbound {
    pub fn data(to: SocketAddr, chunk_id: u32, payload: Vec<u8>) -> Self {
        Outbound {
            to,
            msg_type: MsgType::Data,
            seq: chunk_id,
            payload,
        }
    }

    pub fn request(to: SocketAddr, chunk_id: u32) -> Self {
        Outbound {
            to,
            msg_type: MsgType::Request,
            seq: 0,
            payload: swarm_wire::request::encode(chunk_id),
        }
    }
}

/// Borrowed node state a scheduler may read, plus a queue it writes sends into.
pub struct Ctx<'a> {
    pub self_addr: SocketAddr,
    pub peers: &'a PeerTable,
    pub store: &'a ChunkStore,
    pub outbox: &'a mut Vec<Outbound>,
}

/// The pluggable chunk-scheduling strategy interface. One concrete type per variant,
/// dispatched through `SchedulerKind` rather than a trait object, since the set of
/// strategies is closed and known at compile time.
pub trait Scheduler {
    fn on_start(&mut self, _ctx: &mut Ctx) {}

    fn on_tick(&mut self, _ctx: &mut Ctx) {}

    /// Returns `true` if the packet was fully handled and default node processing
    /// for it should be skipped.
    fn handle_packet(&mut self, _pkt: &Packet, _from: SocketAddr, _ctx: &mut Ctx) -> bool {
        false
    }

    fn on_chunk_received(
        &mut self,
        _chunk_id: u32,
        _payload: &[u8],
        _from: SocketAddr,
        _ctx: &mut Ctx,
    ) {
    }

    fn on_peer_discovered(&mut self, _addr: SocketAddr, _ctx: &mut Ctx) {}

    /// Broadcaster-only hook: a new chunk was just generated and stored locally.
    fn on_chunk_generated(&mut self, _chunk_id: u32, _payload: &[u8], _ctx: &mut Ctx) {}
}

/// Tagged variant over the five concrete strategies. `Splitter` is broadcaster-only;
/// `LegacyPull` is an alternative configuration to the `{DefaultPush, RarestFirst,
/// Edf}` family, never combined with it on the same node.
pub enum SchedulerKind {
    Splitter(Splitter),
    DefaultPush(DefaultPush),
    RarestFirst(RarestFirst),
    Edf(Edf),
    LegacyPull(LegacyPull),
}

impl SchedulerKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerKind::Splitter(_) => "splitter",
            SchedulerKind::DefaultPush(_) => "push",
            SchedulerKind::RarestFirst(_) => "rarest-first",
            SchedulerKind::Edf(_) => "edf",
            SchedulerKind::LegacyPull(_) => "legacy-pull",
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            SchedulerKind::Splitter(s) => s.$method($($arg),*),
            SchedulerKind::DefaultPush(s) => s.$method($($arg),*),
            SchedulerKind::RarestFirst(s) => s.$method($($arg),*),
            SchedulerKind::Edf(s) => s.$method($($arg),*),
            SchedulerKind::LegacyPull(s) => s.$method($($arg),*),
        }
    };
}

impl Scheduler for SchedulerKind {
    fn on_start(&mut self, ctx: &mut Ctx) {
        dispatch!(self, on_start, ctx)
    }

    fn on_tick(&mut self, ctx: &mut Ctx) {
        dispatch!(self, on_tick, ctx)
    }

    fn handle_packet(&mut self, pkt: &Packet, from: SocketAddr, ctx: &mut Ctx) -> bool {
        dispatch!(self, handle_packet, pkt, from, ctx)
    }

    fn on_chunk_received(&mut self, chunk_id: u32, payload: &[u8], from: SocketAddr, ctx: &mut Ctx) {
        dispatch!(self, on_chunk_received, chunk_id, payload, from, ctx)
    }

    fn on_peer_discovered(&mut self, addr: SocketAddr, ctx: &mut Ctx) {
        dispatch!(self, on_peer_discovered, addr, ctx)
    }

    fn on_chunk_generated(&mut self, chunk_id: u32, payload: &[u8], ctx: &mut Ctx) {
        dispatch!(self, on_chunk_generated, chunk_id, payload, ctx)
    }
}
