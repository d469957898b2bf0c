use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use parking_lot::Mutex;

#[derive(Clone, Copy)]
struct ProgressSnapshot {
    cumulative_bytes: u64,
    instant: Instant,
}

/// Estimates upload/download throughput over a sliding window of snapshots, rather than
/// from a raw cumulative counter. Fed by the stats sink on every observed byte transfer.
pub struct SpeedEstimator {
    snapshots: Mutex<VecDeque<ProgressSnapshot>>,
    bytes_per_second: AtomicU64,
}

impl SpeedEstimator {
    pub fn new(window: usize) -> Self {
        assert!(window > 1);
        Self {
            snapshots: Mutex::new(VecDeque::with_capacity(window)),
            bytes_per_second: Default::default(),
        }
    }

    pub fn bps(&self) -> u64 {
        self.bytes_per_second.load(Ordering::Relaxed)
    }

    pub fn add_snapshot(&self, cumulative_bytes: u64, instant: Instant) {
        let first = {
            let mut g = self.snapshots.lock();
            let current = ProgressSnapshot {
                cumulative_bytes,
                instant,
            };
            if g.is_empty() {
                g.push_back(current);
                return;
            } else if g.len() < g.capacity() {
                g.push_back(current);
                g.front().copied().unwrap()
            } else {
                let first = g.pop_front().unwrap();
                g.push_back(current);
                first
            }
        };

        let diff = cumulative_bytes.saturating_sub(first.cumulative_bytes);
        let elapsed = instant.saturating_duration_since(first.instant);
        let bps = if elapsed.as_secs_f64() > 0.0 {
            diff as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        self.bytes_per_second.store(bps as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn estimates_steady_rate() {
        let est = SpeedEstimator::new(4);
        let t0 = Instant::now();
        est.add_snapshot(0, t0);
        est.add_snapshot(1000, t0 + Duration::from_secs(1));
        est.add_snapshot(2000, t0 + Duration::from_secs(2));
        est.add_snapshot(3000, t0 + Duration::from_secs(3));
        // window is full now; next sample evicts the first and measures over [1,4]s
        est.add_snapshot(4000, t0 + Duration::from_secs(4));
        assert_eq!(est.bps(), 1000);
    }

    #[test]
    fn zero_bytes_yields_zero_bps() {
        let est = SpeedEstimator::new(4);
        let t0 = Instant::now();
        est.add_snapshot(0, t0);
        est.add_snapshot(0, t0 + Duration::from_secs(1));
        assert_eq!(est.bps(), 0);
    }
}
