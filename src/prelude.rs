//! Prelude module for convenient imports.
//!
//! ```rust
//! use netgate::prelude::*;
//! ```

// Error handling
pub use crate::error::{NetgateError, Result};

// Throttling
pub use crate::network::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::network::gate::ConnectionIoGate;
pub use crate::network::stats::GateStats;
pub use crate::network::throttle::{SegmentCosts, Throttle, ThrottleBundle, ThrottleTimes};

// Task execution
pub use crate::task::{PoolKind, TaskThreadPool, Waiter, WaiterHandle};

// Settings
pub use crate::settings::pool::PoolOptions;
pub use crate::settings::throttle::ThrottleOptions;
pub use crate::settings::{Settings, SettingsBuilder};
