use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use swarm_core::Role;
use swarm_wire::{ChunkPayload, HandshakePayload, MsgType, Packet, PeerListEntry};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::NodeError;
use crate::fragment::{Reassembler, fragment_frame};
use crate::peer_table::PeerTable;
use crate::scheduler::{Ctx, Outbound, Scheduler, SchedulerKind};
use crate::stats::StatsSink;
use crate::store::ChunkStore;

/// A datagram above this size risks IP fragmentation on a typical 1500B-MTU path.
/// Producers (the fragmenter, bitmap encoder) are expected to stay under it.
pub const SAFE_MTU: usize = 1400;

/// Tunable periodic-loop intervals and liveness timeout. Defaults match the
/// documented periods exactly; the CLI exposes them as overridable flags.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub heartbeat_period: Duration,
    pub bitmap_period: Duration,
    pub tick_period: Duration,
    pub prune_period: Duration,
    pub pex_period: Duration,
    pub stats_report_period: Duration,
    pub liveness_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            heartbeat_period: Duration::from_secs(2),
            bitmap_period: Duration::from_millis(200),
            tick_period: Duration::from_millis(100),
            prune_period: Duration::from_secs(5),
            pex_period: Duration::from_secs(5),
            stats_report_period: Duration::from_secs(3),
            liveness_timeout: Duration::from_secs(5),
        }
    }
}

/// The swarm node: owns the socket, the chunk store, the peer table, the active
/// scheduler and (for viewers) a reassembler. Single logical owner of all of the
/// above — every method here runs to completion before the next is invoked.
pub struct Node {
    self_port: u16,
    role: Role,
    socket: UdpSocket,
    peers: PeerTable,
    store: ChunkStore,
    scheduler: SchedulerKind,
    reassembler: Reassembler,
    stats: Arc<StatsSink>,
    config: NodeConfig,
    frame_sink: Option<UnboundedSender<(u32, Vec<u8>)>>,
    frame_source: Option<UnboundedReceiver<(u32, Vec<u8>)>>,
    stats_reports: HashMap<SocketAddr, serde_json::Value>,
}

impl Node {
    pub async fn bind(
        port: u16,
        role: Role,
        scheduler: SchedulerKind,
        config: NodeConfig,
        stats: Arc<StatsSink>,
    ) -> Result<Self, NodeError> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| NodeError::BindFailed {
                addr: bind_addr,
                source,
            })?;
        // Read back the OS-assigned port rather than trusting `port` verbatim, so
        // binding to the ephemeral port 0 (as tests do) still reports a usable
        // self-address in HANDSHAKE/PEER_LIST.
        let bound_port = socket
            .local_addr()
            .map_err(|source| NodeError::BindFailed {
                addr: bind_addr,
                source,
            })?
            .port();
        Ok(Node {
            self_port: bound_port,
            role,
            socket,
            peers: PeerTable::new(),
            store: ChunkStore::new(),
            scheduler,
            reassembler: Reassembler::new(),
            stats,
            config,
            frame_sink: None,
            frame_source: None,
            stats_reports: HashMap::new(),
        })
    }

    /// Where completed frames get handed off to the renderer (an external collaborator).
    pub fn set_frame_sink(&mut self, sink: UnboundedSender<(u32, Vec<u8>)>) {
        self.frame_sink = Some(sink);
    }

    /// Where the media source (an external collaborator) feeds captured frames in,
    /// for the broadcaster to fragment and distribute. Polled alongside the socket
    /// and timers in `run`.
    pub fn set_frame_source(&mut self, source: UnboundedReceiver<(u32, Vec<u8>)>) {
        self.frame_source = Some(source);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn self_port(&self) -> u16 {
        self.self_port
    }

    pub fn stats(&self) -> &Arc<StatsSink> {
        &self.stats
    }

    /// STATS_REPORTs received from viewers, keyed by sender. Forwarded here for an
    /// external dashboard to poll; has no effect on swarm state.
    pub fn stats_reports(&self) -> &HashMap<SocketAddr, serde_json::Value> {
        &self.stats_reports
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }

    /// Send an initial HANDSHAKE to a bootstrap peer at startup.
    pub async fn connect(&self, bootstrap: SocketAddr) {
        self.send(bootstrap, MsgType::Handshake, 0, HandshakePayload::new(self.role).encode())
            .await;
    }

    /// Broadcaster-only: fragment one captured frame, store its chunks locally, and
    /// hand each to the scheduler's `on_chunk_generated` for distribution.
    pub async fn ingest_frame(&mut self, frame_id: u32, bytes: &[u8]) {
        if self.role != Role::Broadcaster {
            warn!(frame_id, "ingest_frame called on a non-broadcaster node, ignoring");
            return;
        }
        let fragments = match fragment_frame(frame_id, bytes) {
            Ok(f) => f,
            Err(e) => {
                error!(frame_id, error = %e, "failed to fragment frame");
                return;
            }
        };
        for (chunk_id, payload) in fragments {
            let encoded = payload.encode();
            let is_new = self.store.insert(chunk_id.get(), encoded.clone());
            debug_assert!(is_new, "freshly minted chunk_id must be unique");

            let mut outbox = Vec::new();
            {
                let mut ctx = Ctx {
                    self_addr: self.self_addr(),
                    peers: &self.peers,
                    store: &self.store,
                    outbox: &mut outbox,
                };
                self.scheduler
                    .on_chunk_generated(chunk_id.get(), &encoded, &mut ctx);
            }
            self.drain_outbox(outbox).await;
        }
    }

    fn self_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.self_port)
    }

    /// Drive the node until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), NodeError> {
        self.scheduler.on_start(&mut Ctx {
            self_addr: self.self_addr(),
            peers: &self.peers,
            store: &self.store,
            outbox: &mut Vec::new(),
        });

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_period);
        let mut bitmap = tokio::time::interval(self.config.bitmap_period);
        let mut tick = tokio::time::interval(self.config.tick_period);
        let mut prune = tokio::time::interval(self.config.prune_period);
        let mut pex = tokio::time::interval(self.config.pex_period);
        let mut stats_report = tokio::time::interval(self.config.stats_report_period);

        let mut buf = vec![0u8; 65535];
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(role = %self.role, port = self.self_port, "shutting down");
                    return Ok(());
                }
                recv = self.socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((len, addr)) => self.on_datagram(&buf[..len], addr).await,
                        Err(e) => error!(error = %e, "transport recv error"),
                    }
                }
                _ = heartbeat.tick() => self.do_heartbeat_and_ping().await,
                _ = bitmap.tick() => self.do_bitmap_broadcast().await,
                _ = tick.tick() => self.do_scheduler_tick().await,
                _ = prune.tick() => self.do_peer_prune(),
                _ = pex.tick() => self.do_pex().await,
                _ = stats_report.tick() => self.do_stats_report().await,
                frame = async {
                    match self.frame_source.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Some((frame_id, bytes)) = frame {
                        self.ingest_frame(frame_id, &bytes).await;
                    }
                }
            }
        }
    }

    async fn drain_outbox(&self, outbox: Vec<Outbound>) {
        for action in outbox {
            self.send(action.to, action.msg_type, action.seq, action.payload)
                .await;
        }
    }

    /// Best-effort datagram send; errors are logged, never propagated.
    async fn send(&self, to: SocketAddr, msg_type: MsgType, seq: u32, payload: Vec<u8>) {
        let timestamp = now_secs();
        let packet = Packet::new(msg_type, seq, timestamp, payload);
        let encoded = packet.encode();
        if encoded.len() > SAFE_MTU {
            warn!(
                msg_type = ?msg_type,
                len = encoded.len(),
                "outbound datagram exceeds safe MTU"
            );
        }
        match self.socket.send_to(&encoded, to).await {
            Ok(sent) => self.stats.record_upload(sent as u64, Instant::now()),
            Err(e) => error!(%to, error = %e, "transport send error"),
        }
    }

    // ---- inbound dispatch ------------------------------------------------------

    async fn on_datagram(&mut self, bytes: &[u8], addr: SocketAddr) {
        let packet = match Packet::decode(bytes) {
            Ok(p) => p,
            Err(e) => {
                error!(%addr, error = %e, "malformed packet, dropping");
                return;
            }
        };

        let now = Instant::now();
        self.stats.record_download(addr, bytes.len() as u64, now);
        // Unconditional liveness touch, before any other handling.
        self.peers.touch(addr, None, now);

        let handled = {
            let mut outbox = Vec::new();
            let handled = {
                let mut ctx = Ctx {
                    self_addr: self.self_addr(),
                    peers: &self.peers,
                    store: &self.store,
                    outbox: &mut outbox,
                };
                self.scheduler.handle_packet(&packet, addr, &mut ctx)
            };
            self.drain_outbox(outbox).await;
            handled
        };
        if handled {
            return;
        }

        match packet.msg_type {
            MsgType::Handshake => self.handle_handshake(&packet, addr, now).await,
            MsgType::PeerList => self.handle_peer_list(&packet).await,
            MsgType::Ping => self.handle_ping(&packet, addr).await,
            MsgType::Pong => self.handle_pong(&packet, addr),
            MsgType::Heartbeat => trace!(%addr, "heartbeat"),
            MsgType::Bitmap => self.handle_bitmap(&packet, addr, now),
            MsgType::Request => self.handle_request(&packet, addr).await,
            MsgType::Data => self.handle_data(&packet, addr, now).await,
            MsgType::StatsReport => self.handle_stats_report(&packet, addr),
        }
    }

    async fn handle_handshake(&mut self, packet: &Packet, addr: SocketAddr, now: Instant) {
        let payload = match HandshakePayload::decode(&packet.payload) {
            Ok(p) => p,
            Err(e) => {
                error!(%addr, error = %e, "malformed HANDSHAKE payload");
                return;
            }
        };
        self.peers.touch(addr, Some(payload.role), now);

        let bitmap_bytes = swarm_wire::bitmap::encode(self.store.local_bitmap());
        self.send(addr, MsgType::Bitmap, 0, bitmap_bytes).await;

        if self.role == Role::Broadcaster {
            self.send_peer_list(addr).await;
        }

        let mut outbox = Vec::new();
        {
            let mut ctx = Ctx {
                self_addr: self.self_addr(),
                peers: &self.peers,
                store: &self.store,
                outbox: &mut outbox,
            };
            self.scheduler.on_peer_discovered(addr, &mut ctx);
        }
        self.drain_outbox(outbox).await;
    }

    async fn handle_peer_list(&mut self, packet: &Packet) {
        let entries = match swarm_wire::peer_list::decode(&packet.payload) {
            Ok(e) => e,
            Err(e) => {
                error!(error = %e, "malformed PEER_LIST payload");
                return;
            }
        };
        for entry in entries {
            if entry.port == self.self_port {
                continue; // avoid self-loops
            }
            let Ok(ip) = entry.host.parse::<IpAddr>() else {
                warn!(host = %entry.host, "PEER_LIST entry has unparseable host");
                continue;
            };
            let addr = SocketAddr::new(ip, entry.port);
            if self.peers.contains(&addr) {
                continue;
            }
            self.connect(addr).await;
        }
    }

    async fn handle_ping(&self, packet: &Packet, addr: SocketAddr) {
        self.send(addr, MsgType::Pong, 0, packet.payload.clone()).await;
    }

    fn handle_pong(&mut self, packet: &Packet, addr: SocketAddr) {
        let Some(echoed) = swarm_wire::timestamp_payload::decode(&packet.payload) else {
            warn!(%addr, "malformed PONG payload");
            return;
        };
        let rtt_secs = (now_secs() - echoed).max(0.0);
        self.peers
            .update_rtt(addr, Duration::from_secs_f64(rtt_secs));
    }

    fn handle_bitmap(&mut self, packet: &Packet, addr: SocketAddr, now: Instant) {
        match swarm_wire::bitmap::decode(&packet.payload) {
            Ok(set) => self.peers.update_bitmap(addr, set, now),
            Err(e) => error!(%addr, error = %e, "malformed BITMAP payload"),
        }
    }

    async fn handle_request(&self, packet: &Packet, addr: SocketAddr) {
        let Some(chunk_id) = swarm_wire::request::decode(&packet.payload) else {
            warn!(%addr, "malformed REQUEST payload");
            return;
        };
        match self.store.get(chunk_id) {
            Some(payload) => self.send(addr, MsgType::Data, chunk_id, payload.to_vec()).await,
            None => warn!(%addr, chunk_id, "REQUEST for chunk we don't have"),
        }
    }

    async fn handle_data(&mut self, packet: &Packet, addr: SocketAddr, _now: Instant) {
        let chunk_id = packet.seq;
        if self.store.contains(chunk_id) {
            return; // duplicate DATA, already counted in on_datagram
        }
        self.store.insert(chunk_id, packet.payload.clone());

        let mut outbox = Vec::new();
        {
            let mut ctx = Ctx {
                self_addr: self.self_addr(),
                peers: &self.peers,
                store: &self.store,
                outbox: &mut outbox,
            };
            self.scheduler
                .on_chunk_received(chunk_id, &packet.payload, addr, &mut ctx);
        }
        self.drain_outbox(outbox).await;

        if self.role == Role::Viewer
            && let Ok(chunk_payload) = ChunkPayload::decode(&packet.payload)
            && let Some(frame) = self.reassembler.insert(chunk_payload)
        {
            let frame_id = self.reassembler.last_completed_frame_id().unwrap_or_default();
            self.stats.record_buffer_health(
                self.reassembler.pending_frames(),
                self.reassembler.last_completed_frame_id(),
            );
            if let Some(sink) = &self.frame_sink {
                let _ = sink.send((frame_id, frame));
            }
        }
    }

    fn handle_stats_report(&mut self, packet: &Packet, addr: SocketAddr) {
        match serde_json::from_slice(&packet.payload) {
            Ok(value) => {
                self.stats_reports.insert(addr, value);
            }
            Err(e) => error!(%addr, error = %e, "malformed STATS_REPORT payload"),
        }
    }

    // ---- periodic loops ---------------------------------------------------------

    async fn do_heartbeat_and_ping(&mut self) {
        let ts = now_secs();
        let targets = self.peers.active_addrs();
        for addr in targets {
            self.send(addr, MsgType::Heartbeat, 0, Vec::new()).await;
            self.send(
                addr,
                MsgType::Ping,
                0,
                swarm_wire::timestamp_payload::encode(ts),
            )
            .await;
        }
    }

    async fn do_bitmap_broadcast(&mut self) {
        let bitmap_bytes = swarm_wire::bitmap::encode(self.store.local_bitmap());
        self.stats.record_bitmap_summary(
            self.store.local_bitmap().len(),
            self.store.local_bitmap().iter().next_back().copied(),
        );
        let targets = self.peers.active_addrs();
        for addr in targets {
            self.send(addr, MsgType::Bitmap, 0, bitmap_bytes.clone()).await;
        }
    }

    async fn do_scheduler_tick(&mut self) {
        let mut outbox = Vec::new();
        {
            let mut ctx = Ctx {
                self_addr: self.self_addr(),
                peers: &self.peers,
                store: &self.store,
                outbox: &mut outbox,
            };
            self.scheduler.on_tick(&mut ctx);
        }
        self.drain_outbox(outbox).await;
    }

    fn do_peer_prune(&mut self) {
        let now = Instant::now();
        let removed = self.peers.prune(now, self.config.liveness_timeout);
        for addr in removed {
            debug!(%addr, "pruned stale peer");
        }

        let avg_rtt_millis = {
            let rtts: Vec<u64> = self
                .peers
                .active()
                .filter_map(|p| p.rtt.map(|d| d.as_millis() as u64))
                .collect();
            if rtts.is_empty() {
                0
            } else {
                rtts.iter().sum::<u64>() / rtts.len() as u64
            }
        };
        self.stats.record_avg_rtt_millis(avg_rtt_millis);
    }

    async fn do_pex(&mut self) {
        let targets = self.peers.active_addrs();
        for addr in targets {
            self.send_peer_list(addr).await;
        }
    }

    /// Viewers only send STATS_REPORT once a broadcaster peer is known; a
    /// broadcaster-less mesh silently buffers no reports.
    async fn do_stats_report(&mut self) {
        if self.role != Role::Viewer {
            return;
        }
        let Some(broadcaster) = self.peers.broadcaster().map(|p| p.addr) else {
            return;
        };
        let snapshot = self.stats.snapshot();
        let Ok(payload) = serde_json::to_vec(&snapshot) else {
            return;
        };
        self.send(broadcaster, MsgType::StatsReport, 0, payload).await;
    }

    /// Build and send a PEER_LIST to `dest`, choosing the local address reachable
    /// from `dest`.
    async fn send_peer_list(&self, dest: SocketAddr) {
        let self_host = match select_self_address(dest.ip()).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(%dest, error = %e, "self-address discovery failed, skipping PEER_LIST");
                return;
            }
        };

        let mut entries: Vec<PeerListEntry> = self
            .peers
            .active()
            .filter_map(|p| {
                p.role.map(|role| PeerListEntry {
                    host: p.addr.ip().to_string(),
                    port: p.addr.port(),
                    role,
                })
            })
            .collect();
        entries.push(PeerListEntry {
            host: self_host.to_string(),
            port: self.self_port,
            role: self.role,
        });

        let payload = swarm_wire::peer_list::encode(&entries);
        self.send(dest, MsgType::PeerList, 0, payload).await;
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Discover which local address is reachable from `dest`. Loopback destinations
/// get `127.0.0.1` directly; everything else opens a transient "connected" UDP
/// socket to read back the OS-chosen source address, which works even on
/// multi-homed hosts without sending any actual datagram.
async fn select_self_address(dest: IpAddr) -> Result<IpAddr, NodeError> {
    if dest.is_loopback() {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    let bind_addr: SocketAddr = match dest {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let probe = UdpSocket::bind(bind_addr)
        .await
        .map_err(|source| NodeError::SelfAddressDiscovery { dest, source })?;
    probe
        .connect(SocketAddr::new(dest, 1))
        .await
        .map_err(|source| NodeError::SelfAddressDiscovery { dest, source })?;
    probe
        .local_addr()
        .map(|a| a.ip())
        .map_err(|source| NodeError::SelfAddressDiscovery { dest, source })
}
