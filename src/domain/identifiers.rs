//! Identifiers used throughout the audit event model.
//!
//! Each is a newtype so callers cannot accidentally swap an actor id for a
//! target id or a chain name; time-ordered ids use UUID v7 the same way the
//! rest of the corpus does for event-sourced entities.

use nutype::nutype;
use uuid::Uuid;

/// Unique identifier for a single audit event.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRef
))]
pub struct EventId(Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Name of a logical hash chain, e.g. `"global"` or `"tenant:acme"`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct ChainName(String);

impl ChainName {
    pub const GLOBAL: &'static str = "global";

    pub fn global() -> Self {
        Self::try_new(Self::GLOBAL).expect("\"global\" is a valid chain name")
    }
}

impl Default for ChainName {
    fn default() -> Self {
        Self::global()
    }
}

/// Identity of the actor that triggered an event (user id, `ip:<addr>`, or
/// `anonymous`). Never empty per the event-model invariant.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 512),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct ActorId(String);

impl ActorId {
    pub fn anonymous() -> Self {
        Self::try_new("anonymous").expect("\"anonymous\" is a valid actor id")
    }
}

/// Identity of the resource an event is about (call id, bid id, path
/// segment, ...). Distinct from `ActorId` so a reviewer can't confuse who
/// did something with what it was done to.
#[nutype(
    sanitize(trim),
    validate(len_char_max = 512),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef, Default)
)]
pub struct TargetId(String);

/// Optional tenant identifier surfaced by an `IdentityExtractor`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct TenantId(String);

/// Correlation id for a single HTTP request, distinct from the audit
/// event's own `EventId` (a request produces at most two events).
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRef
))]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self::new)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}
