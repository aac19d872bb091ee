use crate::error::{NetgateError, Result};
use crate::network::throttle::window::{SegmentCosts, DEFAULT_WINDOW_SIZE};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Default outbound limit in KiB/s.
pub const DEFAULT_LIMIT_UP_KBPS: u64 = 2048;
/// Default inbound limit in KiB/s.
pub const DEFAULT_LIMIT_DOWN_KBPS: u64 = 8192;

fn default_limit_up() -> u64 {
    DEFAULT_LIMIT_UP_KBPS
}

fn default_limit_down() -> u64 {
    DEFAULT_LIMIT_DOWN_KBPS
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_add_cost() -> usize {
    SegmentCosts::default().add_cost
}

fn default_minimal_segment() -> usize {
    SegmentCosts::default().minimal_segment
}

fn default_max_segment() -> usize {
    SegmentCosts::default().max_segment
}

#[derive(Parser, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Outbound bandwidth limit in KiB/s (0 = unlimited)
    #[arg(long = "limit-rate-up", id = "limit-rate-up", default_value_t = DEFAULT_LIMIT_UP_KBPS)]
    #[serde(default = "default_limit_up")]
    pub limit_up_kbps: u64,

    /// Inbound bandwidth limit in KiB/s (0 = unlimited)
    #[arg(long = "limit-rate-down", id = "limit-rate-down", default_value_t = DEFAULT_LIMIT_DOWN_KBPS)]
    #[serde(default = "default_limit_down")]
    pub limit_down_kbps: u64,

    /// Number of one-second slots in the traffic history
    #[arg(long = "throttle-window", id = "throttle-window", default_value_t = DEFAULT_WINDOW_SIZE)]
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Estimated per-packet TCP/IP overhead in bytes
    #[arg(long = "throttle-add-cost", id = "throttle-add-cost", default_value_t = default_add_cost())]
    #[serde(default = "default_add_cost")]
    pub add_cost: usize,

    /// Smallest segment a packet is accounted as, in bytes
    #[arg(long = "throttle-min-segment", id = "throttle-min-segment", default_value_t = default_minimal_segment())]
    #[serde(default = "default_minimal_segment")]
    pub minimal_segment: usize,

    /// Largest transport size ever recommended, in bytes
    #[arg(long = "throttle-max-segment", id = "throttle-max-segment", default_value_t = default_max_segment())]
    #[serde(default = "default_max_segment")]
    pub max_segment: usize,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        ThrottleOptions {
            limit_up_kbps: DEFAULT_LIMIT_UP_KBPS,
            limit_down_kbps: DEFAULT_LIMIT_DOWN_KBPS,
            window_size: DEFAULT_WINDOW_SIZE,
            add_cost: default_add_cost(),
            minimal_segment: default_minimal_segment(),
            max_segment: default_max_segment(),
        }
    }
}

impl ThrottleOptions {
    pub fn segment_costs(&self) -> SegmentCosts {
        SegmentCosts {
            add_cost: self.add_cost,
            minimal_segment: self.minimal_segment,
            max_segment: self.max_segment,
        }
    }

    /// Checks that the options describe a usable throttle.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(NetgateError::invalid_setting(
                "window_size",
                "must be at least 1",
            ));
        }
        if self.minimal_segment > self.max_segment {
            return Err(NetgateError::invalid_setting(
                "minimal_segment",
                format!(
                    "{} exceeds max_segment {}",
                    self.minimal_segment, self.max_segment
                ),
            ));
        }
        Ok(())
    }
}
