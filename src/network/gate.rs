//! Per-connection transport glue.
//!
//! A [`ConnectionIoGate`] sits between a peer connection and its socket. The
//! transport asks it how long to wait before a send, then reports every
//! read and write back so both the connection's own throttles and the
//! process-wide throttles stay current.

use crate::network::clock::{Clock, MonotonicClock};
use crate::network::stats::{GateStats, GateStatsRecorder};
use crate::network::throttle::bundle::{BundleSnapshot, ThrottleBundle};
use crate::settings::throttle::ThrottleOptions;
use crate::utils::seconds_to_duration;
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Upper bound on sleep/recompute rounds in a single paced send.
pub const MAX_PACING_ROUNDS: usize = 64;

const STATS_ALPHA: f64 = 0.5;

/// Throttle front-end for one peer connection.
#[derive(Debug)]
pub struct ConnectionIoGate {
    global: Arc<ThrottleBundle>,
    connection: ThrottleBundle,
    stats: Mutex<GateStatsRecorder>,
}

impl ConnectionIoGate {
    /// Creates a gate for connection `name`, bound to the global bundle.
    pub fn new(name: impl Into<String>, options: &ThrottleOptions) -> Self {
        Self::with_bundles(
            ThrottleBundle::global(),
            ThrottleBundle::new(name, options),
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Creates a gate from explicit bundles. `clock` drives throughput
    /// sampling only.
    pub fn with_bundles(
        global: Arc<ThrottleBundle>,
        connection: ThrottleBundle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            global,
            connection,
            stats: Mutex::new(GateStatsRecorder::new(STATS_ALPHA, clock)),
        }
    }

    pub fn connection(&self) -> &ThrottleBundle {
        &self.connection
    }

    pub fn global(&self) -> &ThrottleBundle {
        &self.global
    }

    fn stats_lock(&self) -> MutexGuard<'_, GateStatsRecorder> {
        self.stats.lock().unwrap_or_else(|poisoned| {
            warn!("{}: recovering poisoned stats lock", self.connection.scope());
            poisoned.into_inner()
        })
    }

    /// How long to wait before sending `size` bytes: the larger of the
    /// connection and global outbound delays.
    pub fn send_delay(&self, size: usize) -> Duration {
        let own = self.connection.outbound.get_sleep_time_after_tick(size);
        let shared = self.global.outbound.get_sleep_time_after_tick(size);
        seconds_to_duration(own.max(shared))
    }

    /// Blocks the calling thread until `size` bytes may be sent.
    ///
    /// # Returns
    ///
    /// The total time slept
    pub fn pace_send(&self, size: usize) -> Duration {
        self.pace_send_with(size, thread::sleep)
    }

    /// Like [`pace_send`](Self::pace_send), with a caller-provided sleep.
    ///
    /// The delay is recomputed after every sleep since other connections
    /// may have used the shared budget meanwhile.
    pub fn pace_send_with(&self, size: usize, mut sleeper: impl FnMut(Duration)) -> Duration {
        let mut slept = Duration::ZERO;
        let mut rounds = 0;

        loop {
            let delay = self.send_delay(size);
            if delay.is_zero() {
                break;
            }
            if rounds == MAX_PACING_ROUNDS {
                debug!(
                    "{}: giving up pacing after {} rounds, {:?} still pending",
                    self.connection.scope(),
                    rounds,
                    delay
                );
                break;
            }
            sleeper(delay);
            slept = slept.saturating_add(delay);
            rounds += 1;
        }

        self.stats_lock().record_pacing(slept);
        slept
    }

    /// Records `size` payload bytes written to a TCP socket.
    pub fn after_send(&self, size: usize) {
        self.connection.outbound.handle_traffic_tcp(size);
        self.global.outbound.handle_traffic_tcp(size);
        self.stats_lock().record_sent(size);
    }

    /// Records `size` bytes written to a transport without TCP framing.
    pub fn after_send_exact(&self, size: usize) {
        self.connection.outbound.handle_traffic_exact(size);
        self.global.outbound.handle_traffic_exact(size);
        self.stats_lock().record_sent(size);
    }

    /// Records `size` payload bytes read from the socket.
    pub fn after_receive(&self, size: usize) {
        self.connection.inbound.handle_traffic_tcp(size);
        self.global.inbound.handle_traffic_tcp(size);
        self.stats_lock().record_received(size);
    }

    /// Records an inbound request of `size` payload bytes.
    pub fn after_request(&self, size: usize) {
        self.connection.inbound_request.handle_traffic_tcp(size);
        self.global.inbound_request.handle_traffic_tcp(size);
        self.stats_lock().record_requested(size);
    }

    /// Reports a congestion event to both outbound throttles.
    pub fn handle_congestion(&self, level: f64) {
        self.connection.outbound.handle_congestion(level);
        self.global.outbound.handle_congestion(level);
    }

    pub fn stats(&self) -> GateStats {
        self.stats_lock().snapshot()
    }

    /// Throttle state of this connection.
    pub fn throttle_snapshot(&self) -> BundleSnapshot {
        self.connection.snapshot()
    }
}
