//! Builds, signs, and forwards audit events to a sink.
//!
//! Grounded on `RingBufferAuditRecorder`'s "record_*_event" orchestration
//! shape (build event → serialize → hand off) combined with the teacher's
//! `AuditLogChain` sequencing, generalized to a keyed signature and a
//! pluggable sink instead of a fixed ring buffer.

use crate::clock::Clock;
use crate::crypto::hash_chain::HashChain;
use crate::crypto::signature::{SecretKey, Signature};
use crate::domain::enums::{ActionResult, DataClass, EventType, Severity};
use crate::domain::event::{AuditEvent, EventDraft, TimestampTolerance};
use crate::domain::identifiers::{ActorId, ChainName, EventId, TargetId};
use crate::error::Error;
use crate::sanitizer::{self, default_sensitive_keys};
use crate::sink::AuditSink;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Inputs for a single `Emitter::log` call. Mirrors the distillation's
/// `Log(context, type, actorId, targetId, action, result, metadata)`
/// operation, plus the severity/target-type/data-class attributes the full
/// data model also carries.
pub struct LogRequest {
    pub chain: ChainName,
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

impl LogRequest {
    pub fn new(
        event_type: EventType,
        actor_id: ActorId,
        target_id: TargetId,
        action: impl Into<String>,
        result: ActionResult,
    ) -> Self {
        Self {
            chain: ChainName::global(),
            event_type,
            severity: Severity::Low,
            actor_id,
            target_id,
            target_type: String::new(),
            action: action.into(),
            result,
            data_classes: BTreeSet::new(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_chain(mut self, chain: ChainName) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = target_type.into();
        self
    }

    pub fn with_data_classes(mut self, classes: BTreeSet<DataClass>) -> Self {
        self.data_classes = classes;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The only component that creates events. Holds every collaborator the
/// event model's lifecycle needs: a clock, the signing key, the hash-chain
/// registry, and the sink.
pub struct Emitter {
    clock: Arc<dyn Clock>,
    signing_key: SecretKey,
    hash_chain: Arc<HashChain>,
    sink: Arc<dyn AuditSink>,
    sensitive_keys: HashSet<String>,
    timestamp_tolerance: TimestampTolerance,
}

impl Emitter {
    pub fn new(
        clock: Arc<dyn Clock>,
        signing_key: SecretKey,
        hash_chain: Arc<HashChain>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            clock,
            signing_key,
            hash_chain,
            sink,
            sensitive_keys: default_sensitive_keys(),
            timestamp_tolerance: TimestampTolerance::default(),
        }
    }

    pub fn with_sensitive_keys(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.sensitive_keys.extend(extra);
        self
    }

    pub fn with_timestamp_tolerance(mut self, tolerance: TimestampTolerance) -> Self {
        self.timestamp_tolerance = tolerance;
        self
    }

    /// Builds, signs, and submits one event: sanitize → canonicalize →
    /// chain → sign → submit. Schema validation failures are returned to
    /// the caller as `Error::InvalidEvent` without ever reaching the sink;
    /// sink failures are also returned, so the middleware can apply its
    /// `continueOnError` policy.
    #[instrument(skip(self, request), fields(chain = %request.chain, event_type = %request.event_type.wire_tag()))]
    pub async fn log(&self, request: LogRequest) -> Result<AuditEvent, Error> {
        let metadata = sanitizer::sanitize(&request.metadata, &self.sensitive_keys);

        let draft = EventDraft {
            id: EventId::generate(),
            timestamp: self.clock.now_utc(),
            event_type: request.event_type,
            severity: request.severity,
            actor_id: request.actor_id,
            target_id: request.target_id,
            target_type: request.target_type,
            action: request.action,
            result: request.result,
            data_classes: request.data_classes,
            metadata,
        }
        .validate(self.clock.now_utc(), self.timestamp_tolerance)?;

        let link = self.hash_chain.append(&request.chain, &draft.canonical_bytes());
        let signature = Signature::compute(&link.event_hash, &self.signing_key);

        let event = AuditEvent {
            id: draft.id,
            sequence: link.sequence,
            timestamp: draft.timestamp,
            event_type: draft.event_type,
            severity: draft.severity,
            actor_id: draft.actor_id,
            target_id: draft.target_id,
            target_type: draft.target_type,
            action: draft.action,
            result: draft.result,
            data_classes: draft.data_classes,
            metadata: draft.metadata,
            previous_hash: link.previous_hash,
            event_hash: link.event_hash,
            signature: signature.to_base64(),
        };

        if let Err(e) = self.sink.submit(&event).await {
            warn!(error = %e, "audit sink submission failed");
            return Err(Error::Sink(e.to_string()));
        }

        Ok(event)
    }
}
