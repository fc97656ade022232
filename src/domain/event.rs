//! The immutable audit event type and its schema validation.
//!
//! Grounded on the teacher's `AuditLogEntry`/`IntegrityProof` (builder that
//! seals on append) combined with `events.rs`'s serde-tagged-enum style,
//! adapted to the flatter shape the wire spec requires (a single sealed
//! record per event rather than a generic `AuditLogEntry<T>`).

use crate::domain::enums::{ActionResult, DataClass, EventType, Severity};
use crate::domain::identifiers::{ActorId, EventId, TargetId};
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Maximum nesting depth a metadata value may have before the event is
/// rejected outright (not truncated — this is a caller bug, not an
/// oversized-but-legitimate payload).
pub const MAX_METADATA_DEPTH: usize = 8;

/// Serialized-event size cap. Past this, individual oversized metadata
/// string values are truncated rather than failing the whole event.
pub const MAX_EVENT_BYTES: usize = 100 * 1024;

const TRUNCATED_MARKER: &str = "[TRUNCATED]";

/// How far a timestamp may drift from "now" before an event is rejected.
#[derive(Debug, Clone, Copy)]
pub struct TimestampTolerance {
    pub max_future: chrono::Duration,
    pub max_past: chrono::Duration,
}

impl Default for TimestampTolerance {
    fn default() -> Self {
        Self {
            max_future: chrono::Duration::seconds(60),
            max_past: chrono::Duration::hours(1),
        }
    }
}

/// Unsealed event contents: everything needed to compute canonical bytes
/// for hashing, before a sequence/hash/signature exists.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: Severity,
    pub actor_id: ActorId,
    pub target_id: TargetId,
    pub target_type: String,
    pub action: String,
    pub result: ActionResult,
    pub data_classes: BTreeSet<DataClass>,
    pub metadata: Value,
}

/// A canonical (field-sorted, deterministic-number, RFC-3339-nanosecond)
/// view of an `EventDraft`, used both to compute the hash-chain digest and
/// to serialize the sealed event.
#[derive(Debug, Serialize)]
struct CanonicalDraft<'a> {
    #[serde(rename = "actionResult")]
    action_result: &'a str,
    #[serde(rename = "actionVerb")]
    action_verb: &'a str,
    #[serde(rename = "actorId")]
    actor_id: &'a str,
    #[serde(rename = "dataClasses")]
    data_classes: Vec<&'static str>,
    #[serde(rename = "eventId")]
    event_id: String,
    #[serde(rename = "eventType")]
    event_type: &'a str,
    metadata: &'a Value,
    severity: &'static str,
    #[serde(rename = "targetId")]
    target_id: &'a str,
    #[serde(rename = "targetType")]
    target_type: &'a str,
    timestamp: String,
}

fn data_class_tag(class: DataClass) -> &'static str {
    match class {
        DataClass::Public => "public",
        DataClass::Internal => "internal",
        DataClass::Confidential => "confidential",
        DataClass::Restricted => "restricted",
        DataClass::Pii => "pii",
        DataClass::Payment => "payment",
        DataClass::Security => "security",
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "LOW",
        Severity::Medium => "MEDIUM",
        Severity::High => "HIGH",
        Severity::Critical => "CRITICAL",
    }
}

fn action_result_tag(result: ActionResult) -> &'static str {
    match result {
        ActionResult::Initiated => "INITIATED",
        ActionResult::Success => "SUCCESS",
        ActionResult::ClientError => "CLIENT_ERROR",
        ActionResult::ServerError => "SERVER_ERROR",
        ActionResult::Blocked => "BLOCKED",
        ActionResult::Exceeded => "EXCEEDED",
    }
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Truncates oversized string leaves (depth-first, longest first) until the
/// canonical encoding of `draft` no longer exceeds `MAX_EVENT_BYTES`, or
/// there is nothing left to truncate.
fn fit_metadata_to_budget(mut metadata: Value, canonical_len_without_metadata: usize) -> Value {
    fn longest_string_path(value: &Value, path: Vec<String>, best: &mut Option<(usize, Vec<String>)>) {
        match value {
            Value::String(s) => {
                if best.as_ref().map(|(len, _)| s.len() > *len).unwrap_or(true) {
                    *best = Some((s.len(), path));
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    let mut next = path.clone();
                    next.push(k.clone());
                    longest_string_path(v, next, best);
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    let mut next = path.clone();
                    next.push(i.to_string());
                    longest_string_path(v, next, best);
                }
            }
            _ => {}
        }
    }

    fn set_at_path(value: &mut Value, path: &[String]) {
        let Some((head, rest)) = path.split_first() else { return };
        match value {
            Value::Object(map) => {
                if let Some(child) = map.get_mut(head) {
                    if rest.is_empty() {
                        *child = Value::String(TRUNCATED_MARKER.to_string());
                    } else {
                        set_at_path(child, rest);
                    }
                }
            }
            Value::Array(items) => {
                if let Ok(idx) = head.parse::<usize>() {
                    if let Some(child) = items.get_mut(idx) {
                        if rest.is_empty() {
                            *child = Value::String(TRUNCATED_MARKER.to_string());
                        } else {
                            set_at_path(child, rest);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    loop {
        let metadata_len = serde_json::to_vec(&metadata).map(|b| b.len()).unwrap_or(0);
        if metadata_len + canonical_len_without_metadata <= MAX_EVENT_BYTES {
            break;
        }
        let mut best = None;
        longest_string_path(&metadata, Vec::new(), &mut best);
        match best {
            Some((len, path)) if len > TRUNCATED_MARKER.len() => set_at_path(&mut metadata, &path),
            _ => break,
        }
    }
    metadata
}

impl EventDraft {
    /// Validates against the event-model schema rules, returning
    /// `Error::InvalidEvent` on the first violation. On success, returns a
    /// version with any oversized metadata string values truncated.
    pub fn validate(
        mut self,
        now: DateTime<Utc>,
        tolerance: TimestampTolerance,
    ) -> Result<Self, Error> {
        if self.action.trim().is_empty() {
            return Err(Error::InvalidEvent("action must not be empty".into()));
        }
        if self.timestamp > now + tolerance.max_future {
            return Err(Error::InvalidEvent(
                "timestamp is too far in the future".into(),
            ));
        }
        if self.timestamp < now - tolerance.max_past {
            return Err(Error::InvalidEvent("timestamp is too far in the past".into()));
        }
        if json_depth(&self.metadata) > MAX_METADATA_DEPTH {
            return Err(Error::InvalidEvent(format!(
                "metadata depth exceeds {MAX_METADATA_DEPTH}"
            )));
        }

        let canonical = self.to_canonical();
        let without_metadata_len = serde_json::to_vec(&CanonicalDraft {
            metadata: &Value::Null,
            ..canonical
        })
        .map(|b| b.len())
        .unwrap_or(0);
        self.metadata = fit_metadata_to_budget(self.metadata, without_metadata_len);

        Ok(self)
    }

    fn to_canonical(&self) -> CanonicalDraft<'_> {
        CanonicalDraft {
            action_result: action_result_tag(self.result),
            action_verb: &self.action,
            actor_id: self.actor_id.as_ref(),
            data_classes: {
                let mut tags: Vec<_> = self.data_classes.iter().copied().map(data_class_tag).collect();
                tags.sort_unstable();
                tags
            },
            event_id: self.id.to_string(),
            event_type: self.event_type.wire_tag(),
            metadata: &self.metadata,
            severity: severity_tag(self.severity),
            target_id: self.target_id.as_ref(),
            target_type: &self.target_type,
            timestamp: self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
        }
    }

    /// Deterministic byte encoding used both as the HashChain input and as
    /// the event's own canonical representation. `serde_json`'s map
    /// serialization already preserves struct field declaration order and
    /// contains no insignificant whitespace; field names above are chosen
    /// to sort lexicographically already, satisfying the "keys sorted"
    /// canonicalization rule without a second pass.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_canonical()).expect("canonical draft always serializes")
    }
}

/// A sealed `AuditEvent`. Once built it is never mutated; every field that
/// contributed to `event_hash` is private so a caller cannot tamper with a
/// signed event in place.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: Severity,
    pub actor_id: ActorId,
    pub target_id: TargetId,
    pub target_type: String,
    pub action: String,
    pub result: ActionResult,
    pub data_classes: BTreeSet<DataClass>,
    pub metadata: Value,
    #[serde(with = "hex_bytes")]
    pub previous_hash: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub event_hash: [u8; 32],
    pub signature: String,
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

impl AuditEvent {
    /// Rebuilds the JSON object this event's fields represent, primarily
    /// for tests and external verifiers that want to inspect
    /// `metadata.request_body`-style paths without re-deriving serde glue.
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn as_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.to_string()));
        map.insert("sequence".into(), Value::from(self.sequence));
        map.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)),
        );
        map.insert(
            "eventType".into(),
            Value::String(self.event_type.wire_tag().to_string()),
        );
        map.insert(
            "severity".into(),
            Value::String(severity_tag(self.severity).to_string()),
        );
        map.insert("actorId".into(), Value::String(self.actor_id.to_string()));
        map.insert("targetId".into(), Value::String(self.target_id.to_string()));
        map.insert("targetType".into(), Value::String(self.target_type.clone()));
        map.insert("action".into(), Value::String(self.action.clone()));
        map.insert(
            "result".into(),
            Value::String(action_result_tag(self.result).to_string()),
        );
        map.insert(
            "dataClasses".into(),
            Value::Array(
                self.data_classes
                    .iter()
                    .copied()
                    .map(|c| Value::String(data_class_tag(c).to_string()))
                    .collect(),
            ),
        );
        map.insert("metadata".into(), self.metadata.clone());
        map.insert("previousHash".into(), Value::String(hex::encode(self.previous_hash)));
        map.insert("eventHash".into(), Value::String(hex::encode(self.event_hash)));
        map.insert("signature".into(), Value::String(self.signature.clone()));
        Value::Object(map)
    }
}
