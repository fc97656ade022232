//! Closed enumerations used by the audit event model.

use nutype::nutype;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// The event type tag. The closed set from the distillation, plus an
/// escape hatch for domain-specific tags (`CALL_CREATED`, `BID_PLACED`,
/// ...) that the core does not itself define but must be able to carry
/// when an integrator's call-exchange handlers emit through the same
/// Emitter. Serializes as the bare tag string (`"API_REQUEST"`,
/// `"CALL_CREATED"`, ...) since that is what the canonical encoding and
/// the wire event model both expect in the `eventType` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    ApiRequest,
    ApiResponse,
    SecurityIncident,
    RateLimitExceeded,
    DataAccess,
    ComplianceViolation,
    SystemFailure,
    Domain(DomainTag),
}

impl EventType {
    /// The wire tag as it appears in a canonicalized event.
    pub fn wire_tag(&self) -> &str {
        match self {
            EventType::ApiRequest => "API_REQUEST",
            EventType::ApiResponse => "API_RESPONSE",
            EventType::SecurityIncident => "SECURITY_INCIDENT",
            EventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            EventType::DataAccess => "DATA_ACCESS",
            EventType::ComplianceViolation => "COMPLIANCE_VIOLATION",
            EventType::SystemFailure => "SYSTEM_FAILURE",
            EventType::Domain(tag) => tag.as_ref(),
        }
    }

    /// Parses a wire tag, falling back to `Domain` for anything outside
    /// the core's own closed set.
    pub fn parse(tag: &str) -> Result<Self, String> {
        Ok(match tag {
            "API_REQUEST" => EventType::ApiRequest,
            "API_RESPONSE" => EventType::ApiResponse,
            "SECURITY_INCIDENT" => EventType::SecurityIncident,
            "RATE_LIMIT_EXCEEDED" => EventType::RateLimitExceeded,
            "DATA_ACCESS" => EventType::DataAccess,
            "COMPLIANCE_VIOLATION" => EventType::ComplianceViolation,
            "SYSTEM_FAILURE" => EventType::SystemFailure,
            other => EventType::Domain(
                DomainTag::try_new(other).map_err(|e| format!("invalid event type: {e}"))?,
            ),
        })
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_tag())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;
        impl de::Visitor<'_> for TagVisitor {
            type Value = EventType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an event type tag string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EventType, E> {
                EventType::parse(v).map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(TagVisitor)
    }
}

/// A domain-specific event tag such as `CALL_CREATED` or `BID_PLACED`:
/// upper-snake-case, validated so the closed-set guarantee still holds even
/// for the open extension point.
#[nutype(
    sanitize(trim),
    validate(not_empty, regex = r"^[A-Z][A-Z0-9_]*$"),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct DomainTag(String);

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of the action an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionResult {
    #[serde(rename = "INITIATED")]
    Initiated,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "CLIENT_ERROR")]
    ClientError,
    #[serde(rename = "SERVER_ERROR")]
    ServerError,
    #[serde(rename = "BLOCKED")]
    Blocked,
    #[serde(rename = "EXCEEDED")]
    Exceeded,
}

impl ActionResult {
    /// Maps an HTTP status code to the result the middleware records for
    /// an `API_RESPONSE` event.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => ActionResult::Success,
            300..=399 => ActionResult::Success,
            400..=499 => ActionResult::ClientError,
            500..=599 => ActionResult::ServerError,
            _ => ActionResult::ClientError,
        }
    }
}

/// Data sensitivity classes carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClass {
    Public,
    Internal,
    Confidential,
    Restricted,
    Pii,
    Payment,
    Security,
}
