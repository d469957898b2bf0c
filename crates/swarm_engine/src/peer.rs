use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use swarm_core::Role;

/// EWMA smoothing factor applied to each new RTT sample.
const RTT_SMOOTHING: f64 = 0.3;

/// A remote endpoint known to this node. Created on first inbound packet or explicit
/// connect, mutated by packet reception, pruned on liveness timeout.
#[derive(Debug, Clone)]
pub struct Peer {
    pub addr: SocketAddr,
    pub role: Option<Role>,
    pub last_seen: Instant,
    pub rtt: Option<Duration>,
    pub remote_bitmap: BTreeSet<u32>,
}

impl Peer {
    pub fn new(addr: SocketAddr, now: Instant) -> Self {
        Peer {
            addr,
            role: None,
            last_seen: now,
            rtt: None,
            remote_bitmap: BTreeSet::new(),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Smoothed RTT update. The spec permits either EWMA or last-sample; we keep an
    /// EWMA so one delayed PONG doesn't whipsaw the estimate used by dashboards.
    pub fn update_rtt(&mut self, sample: Duration) {
        self.rtt = Some(match self.rtt {
            Some(prev) => {
                let prev_s = prev.as_secs_f64();
                let sample_s = sample.as_secs_f64();
                Duration::from_secs_f64(
                    prev_s * (1.0 - RTT_SMOOTHING) + sample_s * RTT_SMOOTHING,
                )
            }
            None => sample,
        });
    }

    pub fn is_broadcaster(&self) -> bool {
        matches!(self.role, Some(Role::Broadcaster))
    }

    pub fn is_viewer(&self) -> bool {
        matches!(self.role, Some(Role::Viewer))
    }
}
