use crate::network::clock::Clock;
use crate::network::stats::util::ewma::Ewma;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Seconds between two throughput samples.
const SAMPLE_INTERVAL: f64 = 0.1;

/// Point-in-time view of a connection gate's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateStats {
    /// Payload bytes handed to the transport
    pub bytes_sent: u64,
    /// Payload bytes read from the transport
    pub bytes_received: u64,
    /// Payload bytes of inbound requests
    pub bytes_requested: u64,
    /// Total time spent sleeping before sends
    pub paced_time: Duration,
    /// Number of sends that had to wait at least once
    pub paced_sends: u64,
    /// Smoothed outbound throughput in KiB/s, once a sample exists
    pub send_rate_kbps: Option<f64>,
}

/// Accumulates traffic counters for one connection gate.
///
/// Outbound throughput is sampled every 100 ms of clock time and smoothed
/// with an EWMA.
#[derive(Debug)]
pub struct GateStatsRecorder {
    stats: GateStats,
    ewma: Ewma,
    recent_bytes_sent: u64,
    sample_started: Option<f64>,
    clock: Arc<dyn Clock>,
}

impl GateStatsRecorder {
    /// Creates an empty recorder.
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor of the throughput EWMA, in `(0, 1]`
    /// * `clock` - Time source for throughput sampling
    pub fn new(alpha: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            stats: GateStats::default(),
            ewma: Ewma::new(alpha),
            recent_bytes_sent: 0,
            sample_started: None,
            clock,
        }
    }

    /// Records `bytes` handed to the transport and refreshes the
    /// throughput average when a sample interval has elapsed.
    pub fn record_sent(&mut self, bytes: usize) {
        self.stats.bytes_sent = self.stats.bytes_sent.saturating_add(bytes as u64);
        self.recent_bytes_sent = self.recent_bytes_sent.saturating_add(bytes as u64);

        let now = self.clock.now_seconds();
        let started = *self.sample_started.get_or_insert(now);
        let elapsed = now - started;
        if elapsed >= SAMPLE_INTERVAL {
            let rate = (self.recent_bytes_sent as f64 / 1024.0) / elapsed;
            self.stats.send_rate_kbps = Some(self.ewma.update(rate));
            self.recent_bytes_sent = 0;
            self.sample_started = Some(now);
        }
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.stats.bytes_received = self.stats.bytes_received.saturating_add(bytes as u64);
    }

    pub fn record_requested(&mut self, bytes: usize) {
        self.stats.bytes_requested = self.stats.bytes_requested.saturating_add(bytes as u64);
    }

    /// Records one paced send that slept for `slept` in total.
    pub fn record_pacing(&mut self, slept: Duration) {
        if slept > Duration::ZERO {
            self.stats.paced_time = self.stats.paced_time.saturating_add(slept);
            self.stats.paced_sends = self.stats.paced_sends.saturating_add(1);
        }
    }

    pub fn snapshot(&self) -> GateStats {
        self.stats.clone()
    }

    /// Clears every counter and the throughput average.
    pub fn reset(&mut self) {
        self.stats = GateStats::default();
        self.ewma.reset();
        self.recent_bytes_sent = 0;
        self.sample_started = None;
    }
}
