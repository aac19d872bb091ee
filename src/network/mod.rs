//! Network module for bandwidth accounting and pacing.
//!
//! This module contains the sliding-window throttles, the per-connection
//! gate that transports call around every read and write, and the gate's
//! traffic statistics.

pub mod clock;
pub mod gate;
pub mod stats;
pub mod throttle;
