//! Per-key token-bucket registry and admission decisions.
//!
//! Grounded on the design notes' own suggestion ("a concurrent mapping
//! combined with per-bucket critical sections") and the teacher's lock
//! choice (`parking_lot`, used throughout `proxy/middleware.rs` and the
//! ring buffer variants) rather than adding a `dashmap` dependency the
//! corpus never reaches for.

pub mod bucket;

use crate::endpoint_key::normalize;
use bucket::{AdmitResult, Bucket, BucketConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for one normalized endpoint's rate limit rule.
#[derive(Debug, Clone, Copy)]
pub struct EndpointRateLimit {
    pub requests_per_second: f64,
    pub burst: f64,
    pub window: Duration,
    pub by_ip: bool,
    pub by_user: bool,
    pub by_endpoint: bool,
}

impl Default for EndpointRateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 10.0,
            window: Duration::from_secs(1),
            by_ip: true,
            by_user: false,
            by_endpoint: true,
        }
    }
}

/// What the limiter needs to know about a single request to reach an
/// admission decision.
pub struct AdmissionRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub client_ip: Option<&'a str>,
    pub actor_id: Option<&'a str>,
}

/// Final admission decision, including the limit in effect so the
/// middleware can populate `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub allowed: bool,
    pub retry_after_secs: u64,
    pub limit: Option<f64>,
}

/// Per-process registry mapping a composed bucket key to its `Bucket`.
/// Buckets are created at most once per key even under concurrent callers
/// via a double-checked read-then-write-lock insert.
pub struct Limiter {
    rules: HashMap<String, EndpointRateLimit>,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
}

impl Limiter {
    pub fn new(rules: HashMap<String, EndpointRateLimit>) -> Self {
        Self {
            rules,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn compose_key(endpoint_key: &str, rule: &EndpointRateLimit, request: &AdmissionRequest<'_>) -> String {
        let mut parts = Vec::with_capacity(3);
        if rule.by_endpoint {
            parts.push(endpoint_key.to_string());
        }
        if rule.by_ip {
            if let Some(ip) = request.client_ip {
                parts.push(format!("ip:{ip}"));
            }
        }
        if rule.by_user {
            if let Some(actor) = request.actor_id {
                if actor != "anonymous" {
                    parts.push(format!("user:{actor}"));
                }
            }
        }
        parts.join("|")
    }

    fn bucket_for(&self, key: &str, rule: &EndpointRateLimit, now: Instant) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(buckets.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Bucket::new(
                BucketConfig {
                    capacity: rule.burst,
                    rate_per_sec: rule.requests_per_second,
                },
                now,
            ))
        }))
    }

    /// Reaches an admission decision for one request at `now`. Endpoints
    /// with no matching rule are admitted unconditionally.
    pub fn admit(&self, request: AdmissionRequest<'_>, now: Instant) -> Admission {
        let endpoint_key = normalize(request.method, request.path);
        let Some(rule) = self.rules.get(&endpoint_key) else {
            return Admission {
                allowed: true,
                retry_after_secs: 0,
                limit: None,
            };
        };

        let bucket_key = Self::compose_key(&endpoint_key, rule, &request);
        let bucket = self.bucket_for(&bucket_key, rule, now);
        let AdmitResult {
            allowed,
            retry_after_secs,
        } = bucket.admit(now);

        Admission {
            allowed,
            retry_after_secs,
            limit: Some(rule.requests_per_second),
        }
    }

    /// Removes buckets idle for at least `ttl`. Intended to run on a
    /// periodic `tokio::spawn`ed sweep (see `spawn_eviction_sweep`),
    /// mirroring the teacher's background-task pattern in
    /// `ChunkCapture::start_capture_task`.
    pub fn evict_idle(&self, now: Instant, ttl: Duration) {
        let stale: Vec<String> = self
            .buckets
            .read()
            .iter()
            .filter(|(_, bucket)| bucket.is_idle(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();

        if stale.is_empty() {
            return;
        }
        let mut buckets = self.buckets.write();
        for key in &stale {
            buckets.remove(key);
        }
        debug!(evicted = stale.len(), "evicted idle rate-limit buckets");
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

/// Spawns a background sweep that evicts idle buckets every `window`,
/// using a TTL of `10 * window` as the data model specifies.
pub fn spawn_eviction_sweep(limiter: Arc<Limiter>, window: Duration) -> tokio::task::JoinHandle<()> {
    let ttl = window * 10;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(window.max(Duration::from_millis(1)));
        loop {
            interval.tick().await;
            limiter.evict_idle(Instant::now(), ttl);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_for(endpoint: &str, rule: EndpointRateLimit) -> HashMap<String, EndpointRateLimit> {
        let mut map = HashMap::new();
        map.insert(endpoint.to_string(), rule);
        map
    }

    #[test]
    fn admits_unconditionally_when_no_rule_matches() {
        let limiter = Limiter::new(HashMap::new());
        let now = Instant::now();
        let admission = limiter.admit(
            AdmissionRequest {
                method: "GET",
                path: "/unruled",
                client_ip: Some("1.2.3.4"),
                actor_id: None,
            },
            now,
        );
        assert!(admission.allowed);
        assert!(admission.limit.is_none());
    }

    #[test]
    fn burst_then_throttle_by_ip() {
        let rule = EndpointRateLimit {
            requests_per_second: 10.0,
            burst: 5.0,
            window: Duration::from_secs(1),
            by_ip: true,
            by_user: false,
            by_endpoint: true,
        };
        let limiter = Limiter::new(rules_for("GET:/api/v1/bids", rule));
        let now = Instant::now();

        let statuses: Vec<bool> = (0..7)
            .map(|_| {
                limiter
                    .admit(
                        AdmissionRequest {
                            method: "GET",
                            path: "/api/v1/bids",
                            client_ip: Some("9.9.9.9"),
                            actor_id: None,
                        },
                        now,
                    )
                    .allowed
            })
            .collect();

        assert_eq!(statuses, vec![true, true, true, true, true, false, false]);

        let later = now + Duration::from_secs(1);
        assert!(
            limiter
                .admit(
                    AdmissionRequest {
                        method: "GET",
                        path: "/api/v1/bids",
                        client_ip: Some("9.9.9.9"),
                        actor_id: None,
                    },
                    later,
                )
                .allowed
        );
    }

    #[test]
    fn path_normalization_shares_one_bucket() {
        let rule = EndpointRateLimit {
            burst: 1.0,
            requests_per_second: 1.0,
            ..Default::default()
        };
        let limiter = Limiter::new(rules_for("GET:/api/v1/calls/{id}", rule));
        let now = Instant::now();

        assert!(
            limiter
                .admit(
                    AdmissionRequest {
                        method: "GET",
                        path: "/api/v1/calls/7f7d6e5a-8b1a-4c1e-9b0a-1a2b3c4d5e6f",
                        client_ip: Some("1.1.1.1"),
                        actor_id: None,
                    },
                    now,
                )
                .allowed
        );
        assert!(
            !limiter
                .admit(
                    AdmissionRequest {
                        method: "GET",
                        path: "/api/v1/calls/42",
                        client_ip: Some("1.1.1.1"),
                        actor_id: None,
                    },
                    now,
                )
                .allowed
        );
    }

    #[test]
    fn evicts_idle_buckets() {
        let rule = EndpointRateLimit::default();
        let limiter = Limiter::new(rules_for("GET:/x", rule));
        let now = Instant::now();
        limiter.admit(
            AdmissionRequest {
                method: "GET",
                path: "/x",
                client_ip: Some("1.1.1.1"),
                actor_id: None,
            },
            now,
        );
        assert_eq!(limiter.bucket_count(), 1);

        let later = now + rule.window * 11;
        limiter.evict_idle(later, rule.window * 10);
        assert_eq!(limiter.bucket_count(), 0);
    }
}
