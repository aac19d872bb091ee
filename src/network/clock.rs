//! Monotonic time sources for throttle accounting.
//!
//! Throttles reason in fractional seconds. Production code uses
//! [`MonotonicClock`]; tests drive a [`ManualClock`] so slot rotation can be
//! checked without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic time in seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time in seconds since an arbitrary fixed origin.
    fn now_seconds(&self) -> f64;
}

/// Clock backed by [`Instant`], with millisecond resolution.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_seconds(&self) -> f64 {
        // whole milliseconds keep slot boundaries stable across calls
        self.origin.elapsed().as_millis() as f64 / 1000.0
    }
}

/// Clock advanced explicitly by the caller.
///
/// Time is stored in microseconds so clones share the same reading and
/// updates are visible across threads.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start` seconds.
    pub fn starting_at(start: f64) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    /// Moves the clock forward by `seconds`. Negative values are ignored.
    pub fn advance(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.micros
                .fetch_add((seconds * 1_000_000.0).round() as u64, Ordering::SeqCst);
        }
    }

    /// Sets the clock to an absolute reading in seconds.
    pub fn set(&self, seconds: f64) {
        let micros = if seconds.is_finite() && seconds > 0.0 {
            (seconds * 1_000_000.0).round() as u64
        } else {
            0
        };
        self.micros.store(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}
