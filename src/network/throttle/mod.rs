//! Adaptive bandwidth throttles.
//!
//! [`window::ThrottleWindow`] holds the sliding-window arithmetic,
//! [`limiter::Throttle`] wraps it in a lock, and [`bundle::ThrottleBundle`]
//! groups the inbound, inbound-request and outbound throttles of one scope.

pub mod bundle;
pub mod limiter;
pub mod window;

pub use bundle::{BundleSnapshot, ThrottleBundle};
pub use limiter::{Throttle, ThrottleSnapshot};
pub use window::{SegmentCosts, ThrottleTimes};
