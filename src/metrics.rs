//! Request/error/duration counters, labeled by method and normalized
//! endpoint.
//!
//! Grounded on `proxy/ring_buffer.rs`'s hand-rolled atomic counters
//! (`AtomicU64` with `Ordering::Relaxed` for stats that only need eventual
//! consistency, never a CAS loop) rather than pulling in an external
//! metrics facade the corpus never reaches for.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn status_class(status: u16) -> &'static str {
    match status / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "unknown",
    }
}

#[derive(Debug, Default)]
struct EndpointCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    duration_micros_total: AtomicU64,
}

/// A point-in-time read of one endpoint's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub duration_micros_total: u64,
}

/// Process-wide request metrics. Cheap to clone (wraps an `Arc`); intended
/// to be shared across the middleware and any `/metrics` exporter.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    by_endpoint: Arc<RwLock<HashMap<String, Arc<EndpointCounters>>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters_for(&self, endpoint: &str) -> Arc<EndpointCounters> {
        if let Some(counters) = self.by_endpoint.read().get(endpoint) {
            return Arc::clone(counters);
        }
        let mut map = self.by_endpoint.write();
        Arc::clone(
            map.entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(EndpointCounters::default())),
        )
    }

    /// Records one completed request: increments the request counter,
    /// the duration total, and, when `status >= 400`, the error counter.
    /// `method` and `normalized_endpoint` together form the label; the
    /// status class is folded into the key so cardinality stays bounded
    /// by (method × endpoint × 5) rather than (method × endpoint × N
    /// distinct status codes).
    pub fn record_request(&self, method: &str, normalized_endpoint: &str, status: u16, duration_micros: u64) {
        let key = format!("{method}:{normalized_endpoint}:{}", status_class(status));
        let counters = self.counters_for(&key);
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.duration_micros_total.fetch_add(duration_micros, Ordering::Relaxed);
        if status >= 400 {
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a failure that never produced a normal status-coded
    /// response (e.g. a sink error), against a fixed pseudo-endpoint.
    pub fn record_error(&self, label: &str) {
        self.counters_for(label).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, key: &str) -> EndpointSnapshot {
        match self.by_endpoint.read().get(key) {
            Some(counters) => EndpointSnapshot {
                requests: counters.requests.load(Ordering::Relaxed),
                errors: counters.errors.load(Ordering::Relaxed),
                duration_micros_total: counters.duration_micros_total.load(Ordering::Relaxed),
            },
            None => EndpointSnapshot::default(),
        }
    }

    pub fn snapshot_all(&self) -> HashMap<String, EndpointSnapshot> {
        self.by_endpoint
            .read()
            .iter()
            .map(|(key, counters)| {
                (
                    key.clone(),
                    EndpointSnapshot {
                        requests: counters.requests.load(Ordering::Relaxed),
                        errors: counters.errors.load(Ordering::Relaxed),
                        duration_micros_total: counters.duration_micros_total.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}
