//! Apply-path throughput and latency measurement

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Throughput counters plus an apply-latency histogram
#[derive(Debug)]
pub struct ReplayMetrics {
    events: AtomicU64,
    batches: AtomicU64,
    latency: Mutex<Histogram<u64>>,
}

impl ReplayMetrics {
    /// Create an empty metrics tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            // Three significant figures; auto-resizing, so the sigfig bound
            // is the only way construction can fail
            latency: Mutex::new(Histogram::new(3).expect("3 significant figures is valid")),
        }
    }

    /// Record one committed batch and its application latency
    #[inline]
    pub fn record_batch(&self, events: usize, latency_ns: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(events as u64, Ordering::Relaxed);
        let mut latency = self.latency.lock();
        let _ = latency.record(latency_ns);
    }

    /// Snapshot the counters and latency percentiles
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.latency.lock();
        MetricsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            apply_p50_ns: latency.value_at_quantile(0.50),
            apply_p99_ns: latency.value_at_quantile(0.99),
            apply_max_ns: latency.max(),
        }
    }
}

impl Default for ReplayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics readout
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    /// Events committed
    pub events: u64,
    /// Batches committed
    pub batches: u64,
    /// Median batch application latency in nanoseconds
    pub apply_p50_ns: u64,
    /// 99th percentile batch application latency in nanoseconds
    pub apply_p99_ns: u64,
    /// Worst observed batch application latency in nanoseconds
    pub apply_max_ns: u64,
}
