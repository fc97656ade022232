//! A single token bucket, independently lockable so contention is per-key
//! rather than global.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub capacity: f64,
    pub rate_per_sec: f64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A lazily-created, independently-locked token bucket. `admit` refills
/// based on elapsed monotonic time since the last call, clamps to
/// `[0, capacity]`, and consumes one token on success.
#[derive(Debug)]
pub struct Bucket {
    config: BucketConfig,
    state: Mutex<BucketState>,
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmitResult {
    pub allowed: bool,
    /// Seconds until a token would be available, rounded up. Zero when
    /// `allowed` is true.
    pub retry_after_secs: u64,
}

impl Bucket {
    pub fn new(config: BucketConfig, now: Instant) -> Self {
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: now,
            }),
        }
    }

    pub fn admit(&self, now: Instant) -> AdmitResult {
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.rate_per_sec).min(self.config.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            AdmitResult {
                allowed: true,
                retry_after_secs: 0,
            }
        } else {
            let deficit = 1.0 - state.tokens;
            let wait_secs = if self.config.rate_per_sec > 0.0 {
                deficit / self.config.rate_per_sec
            } else {
                f64::INFINITY
            };
            AdmitResult {
                allowed: false,
                retry_after_secs: wait_secs.ceil() as u64,
            }
        }
    }

    /// Whether this bucket has been idle at least `ttl` — used by the
    /// registry's eviction sweep.
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.state.lock().last_refill) >= ttl
    }
}
