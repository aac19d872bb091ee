//! Settings module for the runtime control parameters.
//!
//! This module contains configuration structures for the bandwidth
//! throttles and the task pools.
//!
//! # Example
//!
//! ```rust
//! use netgate::settings::builder::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .limit_up(256)
//!     .compute_threads(4)
//!     .build();
//! ```

pub mod builder;
pub mod pool;
pub mod runtime;
pub mod throttle;

// Re-export commonly used types
pub use builder::SettingsBuilder;
pub use runtime::Settings;
