//! Injectable time source for the middleware core.
//!
//! Every component that needs wall-clock or monotonic time takes an
//! `Arc<dyn Clock>` rather than calling `Utc::now()`/`Instant::now()`
//! directly, so tests can drive time deterministically (see property P6).

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A source of wall-clock and monotonic time.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Current UTC wall-clock time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current point on a monotonic timeline, used for rate-limit refill
    /// and latency measurement. Not comparable across `Clock` instances.
    fn monotonic(&self) -> Instant;
}

/// The default `Clock`, backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// A deterministic test double. `Instant` has no public constructor, so the
/// monotonic side is modeled as an offset from a single fixed base instant
/// captured at construction; the wall clock is modeled the same way from a
/// fixed base `DateTime`. Both offsets move together under `advance`, which
/// takes `&self` (an `AtomicU64`) so the clock can be shared via `Arc`
/// across concurrent callers without a lock.
pub struct FixedClock {
    base_instant: Instant,
    base_wall: DateTime<Utc>,
    offset_nanos: AtomicU64,
}

impl FixedClock {
    /// Start at the given wall-clock time, with monotonic time pinned to
    /// "now" (at construction) plus zero offset.
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            base_instant: Instant::now(),
            base_wall: wall,
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Advance both the wall clock and the monotonic clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.offset_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl fmt::Debug for FixedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedClock").field("wall", &self.now_utc()).finish()
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.base_wall + self.offset()
    }

    fn monotonic(&self) -> Instant {
        self.base_instant + self.offset()
    }
}
