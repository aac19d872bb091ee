//! Runtime control settings builder.
//!
//! This module provides a fluent builder API for constructing
//! `Settings` in a type-safe and ergonomic way.
//!
//! # Example
//!
//! ```rust
//! use netgate::settings::builder::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .limit_up(512)      // 512 KiB/s outbound
//!     .limit_down(2048)   // 2 MiB/s inbound
//!     .io_threads(4)
//!     .build();
//! ```

use crate::error::Result;
use crate::network::throttle::window::SegmentCosts;
use crate::settings::runtime::Settings;

/// Builder for constructing `Settings`.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outbound limit.
    ///
    /// # Arguments
    ///
    /// * `kbps` - Limit in KiB/s (0 = unlimited)
    pub fn limit_up(mut self, kbps: u64) -> Self {
        self.settings.throttle.limit_up_kbps = kbps;
        self
    }

    /// Sets the inbound limit, shared by inbound and inbound-request traffic.
    ///
    /// # Arguments
    ///
    /// * `kbps` - Limit in KiB/s (0 = unlimited)
    pub fn limit_down(mut self, kbps: u64) -> Self {
        self.settings.throttle.limit_down_kbps = kbps;
        self
    }

    /// Removes both bandwidth limits.
    pub fn unlimited(self) -> Self {
        self.limit_up(0).limit_down(0)
    }

    /// Sets the number of one-second slots kept by each throttle.
    pub fn window_size(mut self, slots: usize) -> Self {
        self.settings.throttle.window_size = slots;
        self
    }

    /// Replaces the TCP cost model.
    pub fn segment_costs(mut self, costs: SegmentCosts) -> Self {
        self.settings.throttle.add_cost = costs.add_cost;
        self.settings.throttle.minimal_segment = costs.minimal_segment;
        self.settings.throttle.max_segment = costs.max_segment;
        self
    }

    /// Sets the compute pool size (0 = hardware concurrency).
    pub fn compute_threads(mut self, threads: usize) -> Self {
        self.settings.pool.compute_threads = threads;
        self
    }

    /// Sets the IO pool size (0 = hardware concurrency).
    pub fn io_threads(mut self, threads: usize) -> Self {
        self.settings.pool.io_threads = threads;
        self
    }

    /// Sets how many extra workers are reserved for leaf tasks.
    pub fn leaf_reserve(mut self, workers: usize) -> Self {
        self.settings.pool.leaf_reserve = workers;
        self
    }

    /// Resets everything to defaults.
    pub fn clear(mut self) -> Self {
        self.settings = Settings::default();
        self
    }

    /// Builds and returns the configured `Settings`.
    pub fn build(self) -> Settings {
        self.settings
    }

    /// Builds the settings, rejecting unusable values.
    pub fn try_build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

impl Settings {
    /// Creates a new builder starting from default settings.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Returns whether any bandwidth limit is active.
    pub fn is_throttled(&self) -> bool {
        self.throttle.limit_up_kbps != 0 || self.throttle.limit_down_kbps != 0
    }
}
