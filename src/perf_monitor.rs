//! Per-normalized-endpoint rolling latency/error stats, with rate-limited
//! `SYSTEM_FAILURE` alerting.
//!
//! Grounded on the same registry shape as [`crate::limiter`] — a
//! `RwLock<HashMap<..>>` of independently-locked entries — applied here to
//! `PerformanceStats` instead of token buckets.

use crate::clock::Clock;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
    pub total_requests: u64,
    pub error_count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl PerformanceStats {
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.error_count as f64 / self.total_requests as f64
        }
    }

    pub fn average_duration(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.total_requests as u32
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PerformanceThresholds {
    pub slow_request_threshold: Duration,
    pub error_rate_threshold: f64,
    pub alert_on_breach: bool,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            slow_request_threshold: Duration::from_secs(1),
            error_rate_threshold: 0.1,
            alert_on_breach: true,
        }
    }
}

/// What the caller should do after recording one request: whether a
/// `SYSTEM_FAILURE` alert should be emitted this time. Rate-limited to at
/// most once per minute per endpoint so a sustained outage produces one
/// alert, not one per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    None,
    SlowRequest,
    ErrorRateBreach,
}

struct EndpointEntry {
    stats: Mutex<PerformanceStats>,
    last_alert: Mutex<Option<Instant>>,
}

impl Default for EndpointEntry {
    fn default() -> Self {
        Self {
            stats: Mutex::new(PerformanceStats::default()),
            last_alert: Mutex::new(None),
        }
    }
}

const ALERT_COOLDOWN: Duration = Duration::from_secs(60);

pub struct PerfMonitor {
    clock: Arc<dyn Clock>,
    thresholds: PerformanceThresholds,
    by_endpoint: RwLock<HashMap<String, Arc<EndpointEntry>>>,
}

impl PerfMonitor {
    pub fn new(clock: Arc<dyn Clock>, thresholds: PerformanceThresholds) -> Self {
        Self {
            clock,
            thresholds,
            by_endpoint: RwLock::new(HashMap::new()),
        }
    }

    fn entry_for(&self, endpoint: &str) -> Arc<EndpointEntry> {
        if let Some(entry) = self.by_endpoint.read().get(endpoint) {
            return Arc::clone(entry);
        }
        let mut map = self.by_endpoint.write();
        Arc::clone(map.entry(endpoint.to_string()).or_default())
    }

    /// Records one request's outcome and returns whether a threshold was
    /// breached in a way that warrants an alert right now.
    pub fn record(&self, endpoint: &str, duration: Duration, is_error: bool) -> AlertDecision {
        let entry = self.entry_for(endpoint);
        let (snapshot, slow) = {
            let mut stats = entry.stats.lock();
            stats.total_requests += 1;
            stats.total_duration += duration;
            if duration > stats.max_duration {
                stats.max_duration = duration;
            }
            if is_error {
                stats.error_count += 1;
            }
            (*stats, duration > self.thresholds.slow_request_threshold)
        };

        if !self.thresholds.alert_on_breach {
            return AlertDecision::None;
        }

        let breach = if slow {
            Some(AlertDecision::SlowRequest)
        } else if snapshot.error_rate() > self.thresholds.error_rate_threshold {
            Some(AlertDecision::ErrorRateBreach)
        } else {
            None
        };

        match breach {
            Some(decision) if self.should_alert(&entry) => decision,
            _ => AlertDecision::None,
        }
    }

    fn should_alert(&self, entry: &EndpointEntry) -> bool {
        let now = self.clock.monotonic();
        let mut last_alert = entry.last_alert.lock();
        let ready = match *last_alert {
            Some(last) => now.saturating_duration_since(last) >= ALERT_COOLDOWN,
            None => true,
        };
        if ready {
            *last_alert = Some(now);
        }
        ready
    }

    pub fn snapshot(&self, endpoint: &str) -> PerformanceStats {
        match self.by_endpoint.read().get(endpoint) {
            Some(entry) => *entry.stats.lock(),
            None => PerformanceStats::default(),
        }
    }
}
