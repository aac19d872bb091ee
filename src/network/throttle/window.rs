//! Sliding-window traffic accounting.
//!
//! [`ThrottleWindow`] is the unlocked core of a throttle. It keeps one byte
//! counter per one-second slot for the last `window_size` seconds and turns
//! that history into a recommended delay for the next packet:
//!
//! ```text
//! delay = max(0, (sum(history) + packet_size) / target_speed - window)
//! ```
//!
//! where `window` is the effective window length, shorter than
//! `window_size` seconds while the throttle is warming up.

use crate::network::clock::Clock;
use log::debug;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Length of one history slot in seconds.
pub const SLOT_SIZE: f64 = 1.0;

/// Number of slots kept when no window size is configured.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Cap applied to a fresh throttle before any limit is configured (16 KiB/s).
pub const DEFAULT_TARGET_SPEED: u64 = 16 * 1024;

/// Forced window used as the short horizon of the transport size estimate.
const SHORT_ESTIMATE_WINDOW: usize = 8;

/// Per-packet cost model used to approximate real TCP/IP wire usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentCosts {
    /// Estimated header overhead added to every packet
    pub add_cost: usize,
    /// Smallest segment a packet is rounded up to
    pub minimal_segment: usize,
    /// Upper bound for recommended transport sizes
    pub max_segment: usize,
}

impl Default for SegmentCosts {
    fn default() -> Self {
        Self {
            add_cost: 128,
            minimal_segment: 256,
            max_segment: 1024 * 1024,
        }
    }
}

impl SegmentCosts {
    /// Estimated wire cost of a TCP payload of `size` bytes.
    pub fn tcp_cost(&self, size: usize) -> usize {
        size.saturating_add(self.add_cost).max(self.minimal_segment)
    }
}

/// Result of a delay computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThrottleTimes {
    /// Average speed over the effective window, in bytes per second
    pub average: f64,
    /// Effective window length in seconds
    pub window: f64,
    /// Seconds to wait before sending the candidate packet
    pub delay: f64,
    /// Bytes that may still be sent without exceeding the target
    pub recommended_size: f64,
}

/// Last congestion event reported for a throttle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Overheat {
    /// Magnitude reported by the congestion detector
    pub level: f64,
    /// Clock reading (seconds) when it was reported
    pub at: f64,
}

/// Unlocked sliding-window state of a throttle.
#[derive(Debug)]
pub struct ThrottleWindow {
    target_speed: u64,
    window_size: usize,
    /// Oldest slot first, current slot last
    history: VecDeque<u64>,
    any_packet_yet: bool,
    last_sample_time: f64,
    start_time: f64,
    overheat: Option<Overheat>,
    costs: SegmentCosts,
    total_packets: u64,
    total_bytes: u64,
    clock: Arc<dyn Clock>,
}

fn time_to_slot(time: f64) -> i64 {
    (time / SLOT_SIZE).floor() as i64
}

impl ThrottleWindow {
    /// Creates an empty window of `window_size` slots (at least one).
    pub fn new(window_size: usize, clock: Arc<dyn Clock>) -> Self {
        let window_size = window_size.max(1);
        Self {
            target_speed: DEFAULT_TARGET_SPEED,
            window_size,
            history: VecDeque::from(vec![0; window_size]),
            any_packet_yet: false,
            last_sample_time: 0.0,
            start_time: 0.0,
            overheat: None,
            costs: SegmentCosts::default(),
            total_packets: 0,
            total_bytes: 0,
            clock,
        }
    }

    pub fn set_segment_costs(&mut self, costs: SegmentCosts) {
        self.costs = costs;
    }

    pub fn segment_costs(&self) -> SegmentCosts {
        self.costs
    }

    /// Replaces the cap in bytes per second. `0` disables throttling.
    pub fn set_target_speed(&mut self, speed: u64) {
        self.target_speed = speed;
    }

    pub fn target_speed(&self) -> u64 {
        self.target_speed
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Per-slot byte counters, oldest first.
    pub fn history(&self) -> Vec<u64> {
        self.history.iter().copied().collect()
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn overheat(&self) -> Option<Overheat> {
        self.overheat
    }

    /// Advances the time reference, rotating out slots that ended since the
    /// previous call.
    pub fn tick(&mut self) {
        let now = self.clock.now_seconds();

        if !self.any_packet_yet {
            self.start_time = now;
            self.last_sample_time = now;
            self.any_packet_yet = true;
            return;
        }

        let current_slot = time_to_slot(now);
        let last_slot = time_to_slot(self.last_sample_time);

        if current_slot > last_slot {
            let elapsed = (current_slot - last_slot) as u64;
            let rotations = elapsed.min(self.window_size as u64) as usize;
            debug!(
                "Moving counter buffer by {} slot(s) ({} < {})",
                rotations, last_slot, current_slot
            );
            for _ in 0..rotations {
                self.history.pop_front();
                self.history.push_back(0);
            }
        }

        if now > self.last_sample_time {
            self.last_sample_time = now;
        }
    }

    /// Records `size` bytes against the current slot after ticking.
    pub fn record_exact(&mut self, size: usize) {
        self.tick();
        if let Some(current) = self.history.back_mut() {
            *current = current.saturating_add(size as u64);
        }
        self.total_packets = self.total_packets.saturating_add(1);
        self.total_bytes = self.total_bytes.saturating_add(size as u64);
    }

    /// Records a TCP payload of `size` bytes at its estimated wire cost.
    /// Returns the number of bytes actually recorded.
    pub fn record_tcp(&mut self, size: usize) -> usize {
        let cost = self.costs.tcp_cost(size);
        self.record_exact(cost);
        cost
    }

    /// Records a congestion report. Non-finite levels are ignored.
    pub fn record_congestion(&mut self, level: f64) {
        if !level.is_finite() {
            return;
        }
        self.overheat = Some(Overheat {
            level,
            at: self.clock.now_seconds(),
        });
    }

    /// Computes average speed, effective window and delay over the full
    /// window. Pure: never mutates state.
    pub fn calculate_times(&self, packet_size: usize) -> ThrottleTimes {
        self.calculate_times_for_window(packet_size, self.window_size)
    }

    /// Same as [`calculate_times`](Self::calculate_times) over the most
    /// recent `window_slots` slots only (clamped to `1..=window_size`).
    pub fn calculate_times_for_window(&self, packet_size: usize, window_slots: usize) -> ThrottleTimes {
        if !self.any_packet_yet {
            return ThrottleTimes::default();
        }

        let slots = window_slots.clamp(1, self.window_size);
        let slots_f = slots as f64;

        // the current slot is only partially elapsed
        let mut window_len = (slots_f - 1.0) * SLOT_SIZE;
        window_len += self.last_sample_time - time_to_slot(self.last_sample_time) as f64 * SLOT_SIZE;

        let time_passed = self.clock.now_seconds() - self.start_time;
        let window = window_len.min(time_passed).max(SLOT_SIZE);

        let sum = self
            .history
            .iter()
            .rev()
            .take(slots)
            .fold(0u64, |acc, &slot| acc.saturating_add(slot));
        let sum_f = sum as f64;
        let average = sum_f / window;

        if self.target_speed == 0 {
            return ThrottleTimes {
                average,
                window,
                delay: 0.0,
                recommended_size: self.costs.max_segment as f64,
            };
        }

        let target = self.target_speed as f64;
        let delay = (sum_f + packet_size as f64) / target - window;
        let delay = if delay.is_finite() && delay > 0.0 {
            delay
        } else {
            0.0
        };

        let good_window = (slots_f / 2.0).min(slots_f / 2.0 + 1.0).max(1.0).min(3.0);
        let span = if window > good_window { window } else { SLOT_SIZE };
        let recommended_size = target * span - sum_f;

        ThrottleTimes {
            average,
            window,
            delay,
            recommended_size,
        }
    }

    /// Seconds the caller should wait before sending `packet_size` bytes.
    pub fn sleep_time(&self, packet_size: usize) -> f64 {
        self.calculate_times(packet_size).delay
    }

    /// Average speed over the completed slots, in bytes per second.
    pub fn current_speed(&self) -> f64 {
        let completed_slots = self.history.len().saturating_sub(1);
        if completed_slots == 0 {
            return 0.0;
        }
        let bytes = self
            .history
            .iter()
            .take(completed_slots)
            .fold(0u64, |acc, &slot| acc.saturating_add(slot));
        bytes as f64 / (completed_slots as f64 * SLOT_SIZE)
    }

    fn recommended_size_for_window(&self, window_slots: usize) -> usize {
        if self.target_speed == 0 {
            return self.costs.max_segment;
        }
        let times = self.calculate_times_for_window(0, window_slots);
        let size = times.recommended_size + self.costs.add_cost as f64;
        if !size.is_finite() || size <= 0.0 {
            return 0;
        }
        size.min(self.costs.max_segment as f64) as usize
    }

    /// How many bytes the transport may plan to move next, taking the
    /// tightest of the full, half and short windows.
    pub fn recommended_transport_size(&self) -> usize {
        [
            self.window_size,
            self.window_size / 2,
            SHORT_ESTIMATE_WINDOW,
        ]
        .into_iter()
        .map(|slots| self.recommended_size_for_window(slots))
        .min()
        .unwrap_or(0)
    }
}
