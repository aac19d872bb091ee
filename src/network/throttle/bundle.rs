use crate::network::clock::{Clock, MonotonicClock};
use crate::network::throttle::limiter::{Throttle, ThrottleSnapshot};
use crate::settings::throttle::ThrottleOptions;
use crate::utils::log_throttle_statistics;
use lazy_static::lazy_static;
use log::info;
use serde::Serialize;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_THROTTLE: Arc<ThrottleBundle> =
        Arc::new(ThrottleBundle::new("global", &ThrottleOptions::default()));
}

/// Inbound, inbound-request and outbound throttles for one scope.
///
/// A scope is either a single peer connection or the whole process. Each
/// throttle has its own lock; the bundle adds none.
#[derive(Debug)]
pub struct ThrottleBundle {
    scope: String,
    pub inbound: Throttle,
    pub inbound_request: Throttle,
    pub outbound: Throttle,
}

/// Diagnostics for all three throttles of a bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundleSnapshot {
    pub scope: String,
    pub inbound: ThrottleSnapshot,
    pub inbound_request: ThrottleSnapshot,
    pub outbound: ThrottleSnapshot,
}

impl ThrottleBundle {
    /// Creates the throttles of `scope` on the monotonic clock.
    pub fn new(scope: impl Into<String>, options: &ThrottleOptions) -> Self {
        Self::with_clock(scope, options, Arc::new(MonotonicClock::new()))
    }

    /// Creates the throttles of `scope`, all reading time from `clock`.
    pub fn with_clock(
        scope: impl Into<String>,
        options: &ThrottleOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scope = scope.into();
        let make = |suffix: &str, kbps: u64| {
            let throttle = Throttle::with_clock(
                format!("{}-{}", scope, suffix),
                options.window_size,
                clock.clone(),
            );
            throttle.set_segment_costs(options.segment_costs());
            throttle.set_target_speed_kbps(kbps);
            throttle
        };

        Self {
            inbound: make("in", options.limit_down_kbps),
            inbound_request: make("inreq", options.limit_down_kbps),
            outbound: make("out", options.limit_up_kbps),
            scope,
        }
    }

    /// Process-wide bundle shared by every connection.
    pub fn global() -> Arc<ThrottleBundle> {
        GLOBAL_THROTTLE.clone()
    }

    /// Applies the configured limits and cost model to the global bundle.
    pub fn configure_global(options: &ThrottleOptions) {
        let global = Self::global();
        for throttle in global.throttles() {
            throttle.set_segment_costs(options.segment_costs());
        }
        global.set_rate_up_limit(options.limit_up_kbps);
        global.set_rate_down_limit(options.limit_down_kbps);
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn throttles(&self) -> [&Throttle; 3] {
        [&self.inbound, &self.inbound_request, &self.outbound]
    }

    /// Sets the outbound limit in KiB/s.
    pub fn set_rate_up_limit(&self, kbps: u64) {
        info!("{}: setting up limit to {} KiB/s", self.scope, kbps);
        self.outbound.set_target_speed_kbps(kbps);
    }

    /// Sets the inbound and inbound-request limits in KiB/s.
    pub fn set_rate_down_limit(&self, kbps: u64) {
        info!("{}: setting down limit to {} KiB/s", self.scope, kbps);
        self.inbound.set_target_speed_kbps(kbps);
        self.inbound_request.set_target_speed_kbps(kbps);
    }

    /// Outbound delay for `size` bytes, with a fresh time reference.
    pub fn get_sleep_time_after_tick(&self, size: usize) -> f64 {
        self.outbound.get_sleep_time_after_tick(size)
    }

    /// Records `size` bytes of outbound TCP traffic.
    pub fn handle_traffic(&self, size: usize) {
        self.outbound.handle_traffic_tcp(size);
    }

    /// Logs speed and totals of all three throttles at `info`.
    pub fn log_statistics(&self) {
        for throttle in self.throttles() {
            log_throttle_statistics(&throttle.snapshot());
        }
    }

    pub fn snapshot(&self) -> BundleSnapshot {
        BundleSnapshot {
            scope: self.scope.clone(),
            inbound: self.inbound.snapshot(),
            inbound_request: self.inbound_request.snapshot(),
            outbound: self.outbound.snapshot(),
        }
    }
}
