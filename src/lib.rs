//! # Netgate - runtime control for a peer-to-peer node's transport
//!
//! Netgate provides the two pieces every connection and every CPU-bound
//! job of a node passes through:
//!
//! * Bandwidth throttling - sliding-window throttles that turn recent
//!   traffic into a recommended delay before the next send, per connection
//!   and process-wide
//! * Task execution - fixed-size worker pools with batch waiters that
//!   report whether any task of a batch failed
//!
//! ## Quick Start
//!
//! ```rust
//! use netgate::prelude::*;
//!
//! let settings = SettingsBuilder::new().limit_up(512).build();
//! let gate = ConnectionIoGate::new("peer-1", &settings.throttle);
//!
//! let pause = gate.send_delay(1400);
//! // sleep for `pause`, write to the socket, then:
//! gate.after_send(1400);
//! # let _ = pause;
//!
//! let pool = TaskThreadPool::new(2);
//! let waiter = Waiter::new(&pool);
//! pool.submit(Some(&waiter), || { /* verify something */ }, false);
//! assert!(waiter.wait());
//! ```

/// Centralized error handling
pub mod error;
/// Console logger setup
pub mod logging;
/// Bandwidth throttles and the per-connection gate
pub mod network;
/// Prelude for convenient imports
pub mod prelude;
/// Configuration settings for throttles and pools
pub mod settings;
/// Worker pools and batch waiters
pub mod task;
/// Shared utility functions
pub mod utils;

// Re-export commonly used types
pub use error::{NetgateError, Result};
