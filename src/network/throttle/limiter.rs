use crate::network::clock::{Clock, MonotonicClock};
use crate::network::throttle::window::{
    Overheat, SegmentCosts, ThrottleTimes, ThrottleWindow, DEFAULT_WINDOW_SIZE,
};
use log::{info, trace, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// A named, internally locked traffic throttle.
///
/// Every operation takes the throttle's own lock. Compound operations such
/// as [`get_sleep_time_after_tick`](Self::get_sleep_time_after_tick) run under
/// a single acquisition so the time reference cannot move in between.
///
/// Throttle methods never sleep; they only compute how long the caller
/// should wait.
#[derive(Debug)]
pub struct Throttle {
    name: String,
    window: Mutex<ThrottleWindow>,
}

/// Point-in-time view of a throttle for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ThrottleSnapshot {
    pub name: String,
    pub target_speed: u64,
    pub window_size: usize,
    pub history: Vec<u64>,
    pub total_packets: u64,
    pub total_bytes: u64,
    pub current_speed: f64,
    pub overheat: Option<Overheat>,
}

impl Throttle {
    /// Creates a throttle with `window_size` one-second slots on the
    /// monotonic clock.
    pub fn new(name: impl Into<String>, window_size: usize) -> Self {
        Self::with_clock(name, window_size, Arc::new(MonotonicClock::new()))
    }

    /// Creates a throttle reading time from `clock`.
    pub fn with_clock(name: impl Into<String>, window_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            window: Mutex::new(ThrottleWindow::new(window_size, clock)),
        }
    }

    /// Creates a throttle with the default ten-slot window.
    pub fn with_default_window(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_WINDOW_SIZE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleWindow> {
        self.window.lock().unwrap_or_else(|poisoned| {
            warn!("Throttle {}: recovering poisoned lock", self.name);
            poisoned.into_inner()
        })
    }

    /// Runs `f` with the window locked, for callers composing several
    /// operations atomically.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut ThrottleWindow) -> R) -> R {
        f(&mut self.lock())
    }

    /// Replaces the cap in bytes per second. `0` means unlimited.
    pub fn set_target_speed(&self, speed: u64) {
        self.lock().set_target_speed(speed);
        info!("Throttle {}: setting limit to {} B/s", self.name, speed);
    }

    /// Replaces the cap, expressed in KiB per second.
    pub fn set_target_speed_kbps(&self, kbps: u64) {
        self.set_target_speed(kbps.saturating_mul(1024));
    }

    pub fn get_target_speed(&self) -> u64 {
        self.lock().target_speed()
    }

    pub fn set_segment_costs(&self, costs: SegmentCosts) {
        self.lock().set_segment_costs(costs);
    }

    /// Advances the time reference.
    pub fn tick(&self) {
        self.lock().tick();
    }

    /// Records `size` bytes verbatim against the current slot.
    pub fn handle_traffic_exact(&self, size: usize) {
        let mut window = self.lock();
        window.record_exact(size);
        self.trace_traffic(&window, size, size);
    }

    /// Records `size` bytes plus estimated TCP/IP overhead.
    pub fn handle_traffic_tcp(&self, size: usize) {
        let mut window = self.lock();
        let recorded = window.record_tcp(size);
        self.trace_traffic(&window, recorded, size);
    }

    fn trace_traffic(&self, window: &ThrottleWindow, recorded: usize, original: usize) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let times = window.calculate_times(0);
        trace!(
            "Throttle {}: packet of ~{}b (from {}b) speed AVG={:.0} B/s [w={:.2}] / limit={} B/s {:?}",
            self.name,
            recorded,
            original,
            times.average,
            times.window,
            window.target_speed(),
            window.history()
        );
    }

    /// Average speed, effective window and delay for a packet of
    /// `packet_size` bytes. Does not mutate state.
    pub fn calculate_times(&self, packet_size: usize) -> ThrottleTimes {
        self.lock().calculate_times(packet_size)
    }

    /// Seconds to wait before sending `packet_size` bytes.
    pub fn get_sleep_time(&self, packet_size: usize) -> f64 {
        self.lock().sleep_time(packet_size)
    }

    /// Ticks, then returns the delay for `packet_size` bytes. This is the
    /// call to make immediately before sending.
    pub fn get_sleep_time_after_tick(&self, packet_size: usize) -> f64 {
        let mut window = self.lock();
        window.tick();
        window.sleep_time(packet_size)
    }

    /// Records an externally observed congestion event. Advisory only.
    pub fn handle_congestion(&self, overheat: f64) {
        self.lock().record_congestion(overheat);
    }

    /// Last reported congestion event, if any.
    pub fn overheat(&self) -> Option<Overheat> {
        self.lock().overheat()
    }

    /// Average speed over completed slots, in bytes per second.
    pub fn get_current_speed(&self) -> f64 {
        self.lock().current_speed()
    }

    /// Bytes the transport may plan to move next.
    pub fn get_recommended_size_of_planned_transport(&self) -> usize {
        self.lock().recommended_transport_size()
    }

    pub fn snapshot(&self) -> ThrottleSnapshot {
        let window = self.lock();
        ThrottleSnapshot {
            name: self.name.clone(),
            target_speed: window.target_speed(),
            window_size: window.window_size(),
            history: window.history(),
            total_packets: window.total_packets(),
            total_bytes: window.total_bytes(),
            current_speed: window.current_speed(),
            overheat: window.overheat(),
        }
    }
}
