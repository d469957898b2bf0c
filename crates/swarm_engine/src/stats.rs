use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use swarm_core::speed_estimator::SpeedEstimator;

/// How many recent per-chunk downloads to remember for the "who is this stream
/// actually coming from" distribution surfaced to the dashboard.
const RECENT_DOWNLOADS_WINDOW: usize = 200;

#[derive(Default, Debug)]
struct AtomicCounters {
    downloaded_bytes: AtomicU64,
    uploaded_bytes: AtomicU64,
    chunks_received: AtomicU64,
    chunks_sent: AtomicU64,
    avg_rtt_millis: AtomicU64,
}

/// Process-wide, additive-counter statistics sink. Initialized once per node and
/// updated from the transport send/receive path, the heartbeat loop (RTT), the
/// bitmap broadcast loop (bitmap summary) and the reassembler (buffer health).
/// External dashboards are out of scope; this struct is simply the data source one
/// would poll.
pub struct StatsSink {
    counters: AtomicCounters,
    down_speed: SpeedEstimator,
    up_speed: SpeedEstimator,
    download_by_source: Mutex<HashMap<SocketAddr, u64>>,
    recent_downloads: Mutex<VecDeque<(SocketAddr, u64)>>,
    buffer_health: Mutex<BufferHealth>,
    bitmap_summary: Mutex<BitmapSummary>,
    startup: Instant,
}

#[derive(Debug, Clone, Default, Serialize)]
struct BufferHealth {
    pending_frames: usize,
    last_completed_frame_id: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct BitmapSummary {
    owned_chunks: usize,
    max_chunk_id: Option<u32>,
}

impl Default for StatsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSink {
    pub fn new() -> Self {
        StatsSink {
            counters: AtomicCounters::default(),
            down_speed: SpeedEstimator::new(5),
            up_speed: SpeedEstimator::new(5),
            download_by_source: Mutex::new(HashMap::new()),
            recent_downloads: Mutex::new(VecDeque::with_capacity(RECENT_DOWNLOADS_WINDOW)),
            buffer_health: Mutex::new(BufferHealth::default()),
            bitmap_summary: Mutex::new(BitmapSummary::default()),
            startup: Instant::now(),
        }
    }

    pub fn record_download(&self, from: SocketAddr, bytes: u64, now: Instant) {
        let total = self
            .counters
            .downloaded_bytes
            .fetch_add(bytes, Ordering::Relaxed)
            + bytes;
        self.counters.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.down_speed.add_snapshot(total, now);

        let mut by_source = self.download_by_source.lock();
        *by_source.entry(from).or_insert(0) += bytes;
        drop(by_source);

        let mut recent = self.recent_downloads.lock();
        if recent.len() == RECENT_DOWNLOADS_WINDOW {
            recent.pop_front();
        }
        recent.push_back((from, bytes));
    }

    pub fn record_upload(&self, bytes: u64, now: Instant) {
        let total = self
            .counters
            .uploaded_bytes
            .fetch_add(bytes, Ordering::Relaxed)
            + bytes;
        self.counters.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.up_speed.add_snapshot(total, now);
    }

    pub fn record_avg_rtt_millis(&self, millis: u64) {
        self.counters.avg_rtt_millis.store(millis, Ordering::Relaxed);
    }

    pub fn record_buffer_health(&self, pending_frames: usize, last_completed_frame_id: Option<u32>) {
        *self.buffer_health.lock() = BufferHealth {
            pending_frames,
            last_completed_frame_id,
        };
    }

    pub fn record_bitmap_summary(&self, owned_chunks: usize, max_chunk_id: Option<u32>) {
        *self.bitmap_summary.lock() = BitmapSummary {
            owned_chunks,
            max_chunk_id,
        };
    }

    /// Who the last `RECENT_DOWNLOADS_WINDOW` chunks actually came from, grouped and
    /// summed by source. Unlike `download_by_source`'s all-time total, this answers
    /// "who is this stream coming from right now" — a peer that stopped sending
    /// drops out of this view once its entries age out of the window.
    pub fn recent_distribution(&self) -> Vec<SourceShare> {
        let recent = self.recent_downloads.lock();
        let mut by_source: HashMap<SocketAddr, u64> = HashMap::new();
        for &(addr, bytes) in recent.iter() {
            *by_source.entry(addr).or_insert(0) += bytes;
        }
        drop(recent);

        let mut shares: Vec<SourceShare> = by_source
            .into_iter()
            .map(|(addr, bytes)| SourceShare { addr, bytes })
            .collect();
        shares.sort_by(|a, b| b.bytes.cmp(&a.bytes));
        shares
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let by_source = self.download_by_source.lock();
        let mut download_by_source: Vec<SourceShare> = by_source
            .iter()
            .map(|(addr, bytes)| SourceShare {
                addr: *addr,
                bytes: *bytes,
            })
            .collect();
        download_by_source.sort_by(|a, b| b.bytes.cmp(&a.bytes));
        drop(by_source);

        StatsSnapshot {
            uptime_secs: self.startup.elapsed().as_secs_f64(),
            downloaded_bytes: self.counters.downloaded_bytes.load(Ordering::Relaxed),
            uploaded_bytes: self.counters.uploaded_bytes.load(Ordering::Relaxed),
            chunks_received: self.counters.chunks_received.load(Ordering::Relaxed),
            chunks_sent: self.counters.chunks_sent.load(Ordering::Relaxed),
            download_bps: self.down_speed.bps(),
            upload_bps: self.up_speed.bps(),
            avg_rtt_millis: self.counters.avg_rtt_millis.load(Ordering::Relaxed),
            buffer_health: self.buffer_health.lock().clone(),
            bitmap_summary: self.bitmap_summary.lock().clone(),
            download_by_source,
            recent_distribution: self.recent_distribution(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceShare {
    addr: SocketAddr,
    bytes: u64,
}

/// Everything an external dashboard would poll, and also the payload shape sent in
/// STATS_REPORT.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    uptime_secs: f64,
    downloaded_bytes: u64,
    uploaded_bytes: u64,
    chunks_received: u64,
    chunks_sent: u64,
    download_bps: u64,
    upload_bps: u64,
    avg_rtt_millis: u64,
    buffer_health: BufferHealth,
    bitmap_summary: BitmapSummary,
    download_by_source: Vec<SourceShare>,
    recent_distribution: Vec<SourceShare>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn tracks_download_attribution() {
        let sink = StatsSink::new();
        let now = Instant::now();
        sink.record_download(addr(1), 100, now);
        sink.record_download(addr(2), 50, now);
        sink.record_download(addr(1), 25, now);

        let snap = sink.snapshot();
        assert_eq!(snap.downloaded_bytes, 175);
        assert_eq!(snap.chunks_received, 3);
        assert_eq!(snap.download_by_source[0].addr, addr(1));
        assert_eq!(snap.download_by_source[0].bytes, 125);
    }

    #[test]
    fn recent_distribution_groups_the_rolling_window_by_source() {
        let sink = StatsSink::new();
        let now = Instant::now();
        sink.record_download(addr(1), 100, now);
        sink.record_download(addr(2), 50, now);
        sink.record_download(addr(1), 25, now);

        let dist = sink.recent_distribution();
        assert_eq!(dist[0].addr, addr(1));
        assert_eq!(dist[0].bytes, 125);
        assert_eq!(dist[1].addr, addr(2));
        assert_eq!(dist[1].bytes, 50);
    }

    #[test]
    fn recent_distribution_drops_entries_once_window_overflows() {
        let sink = StatsSink::new();
        let now = Instant::now();
        sink.record_download(addr(1), 10, now);
        for _ in 0..RECENT_DOWNLOADS_WINDOW {
            sink.record_download(addr(2), 1, now);
        }

        let dist = sink.recent_distribution();
        assert!(dist.iter().all(|s| s.addr != addr(1)), "addr(1)'s single old entry should have aged out");
        assert_eq!(dist.iter().find(|s| s.addr == addr(2)).unwrap().bytes, RECENT_DOWNLOADS_WINDOW as u64);
    }

    #[test]
    fn serializes_snapshot() {
        let sink = StatsSink::new();
        sink.record_buffer_health(3, Some(10));
        sink.record_bitmap_summary(42, Some(999));
        let json = serde_json::to_string(&sink.snapshot()).unwrap();
        assert!(json.contains("\"owned_chunks\":42"));
        assert!(json.contains("\"pending_frames\":3"));
    }
}
