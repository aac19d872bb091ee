//! Shared utility functions.
//!
//! Small conversions and reporting helpers used by the throttles, the
//! connection gate and the task pools.

use crate::network::throttle::limiter::ThrottleSnapshot;
use log::info;
use std::time::Duration;

/// Converts a throttle delay in seconds to a [`Duration`].
///
/// Negative, NaN and infinite inputs map to zero, as do values too large to
/// represent.
///
/// # Arguments
///
/// * `seconds` - Delay in fractional seconds
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
}

/// Number of logical CPUs, never less than one.
pub fn hardware_concurrency() -> usize {
    num_cpus::get().max(1)
}

/// One-line summary of a throttle snapshot's speed and totals.
pub fn format_throttle_statistics(snapshot: &ThrottleSnapshot) -> String {
    let limit = if snapshot.target_speed == 0 {
        "unlimited".to_string()
    } else {
        format!("{:.2} KiB/s", snapshot.target_speed as f64 / 1024.0)
    };

    format!(
        "{}: {:.2} KiB/s of {}, {} packets, {} bytes",
        snapshot.name,
        snapshot.current_speed / 1024.0,
        limit,
        snapshot.total_packets,
        snapshot.total_bytes
    )
}

/// Logs the speed and totals of a throttle snapshot.
///
/// # Arguments
///
/// * `snapshot` - Throttle state to report
pub fn log_throttle_statistics(snapshot: &ThrottleSnapshot) {
    info!("{}", format_throttle_statistics(snapshot));
}
