//! Property-based tests for the universal properties (P1–P8, P10) from the
//! component design. Concrete scenario-style tests live in
//! `tests/scenarios.rs`.

use admission_audit_core::clock::{Clock, FixedClock, SystemClock};
use admission_audit_core::crypto::hash_chain::HashChain;
use admission_audit_core::crypto::signature::{SecretKey, Signature};
use admission_audit_core::domain::enums::{ActionResult, EventType};
use admission_audit_core::domain::identifiers::{ActorId, TargetId};
use admission_audit_core::emitter::{Emitter, LogRequest};
use admission_audit_core::limiter::{AdmissionRequest, EndpointRateLimit, Limiter};
use admission_audit_core::sanitizer::{default_sensitive_keys, sanitize};
use admission_audit_core::sink::VecAuditSink;
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

fn arbitrary_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::hash_map(
                prop_oneof![
                    Just("password".to_string()),
                    Just("email".to_string()),
                    Just("name".to_string()),
                    Just("nested".to_string()),
                ],
                inner,
                0..4,
            )
            .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    /// P4 — Sanitizer idempotence: sanitizing twice equals sanitizing once.
    #[test]
    fn p4_sanitizer_is_idempotent(value in arbitrary_json()) {
        let sensitive = default_sensitive_keys();
        let once = sanitize(&value, &sensitive);
        let twice = sanitize(&once, &sensitive);
        prop_assert_eq!(once, twice);
    }

    /// P8 — PII non-leakage: no value that lived under a sensitive key
    /// survives sanitization as a literal string anywhere in the output.
    #[test]
    fn p8_no_sensitive_value_leaks(value in arbitrary_json()) {
        let sensitive = default_sensitive_keys();
        let output = sanitize(&value, &sensitive);

        fn collect_redacted_originals(value: &serde_json::Value, sensitive: &std::collections::HashSet<String>, out: &mut Vec<String>) {
            if let serde_json::Value::Object(map) = value {
                for (k, v) in map {
                    if k.to_lowercase().contains("password") || k.to_lowercase().contains("email") {
                        let _ = sensitive;
                        if let serde_json::Value::String(s) = v {
                            if !s.is_empty() {
                                out.push(s.clone());
                            }
                        }
                    } else {
                        collect_redacted_originals(v, sensitive, out);
                    }
                }
            } else if let serde_json::Value::Array(items) = value {
                for item in items {
                    collect_redacted_originals(item, sensitive, out);
                }
            }
        }

        let mut originals = Vec::new();
        collect_redacted_originals(&value, &sensitive, &mut originals);
        let serialized = serde_json::to_string(&output).unwrap();
        for original in originals {
            prop_assert!(!serialized.contains(&original));
        }
    }

    /// P7 — Endpoint normalization: any two UUIDs collapse to the same key,
    /// and so do any two base-10 integers.
    #[test]
    fn p7_uuid_segments_collapse_identically(a in prop::array::uniform16(any::<u8>()), b in prop::array::uniform16(any::<u8>())) {
        let ua = Uuid::from_bytes(a);
        let ub = Uuid::from_bytes(b);
        let left = admission_audit_core::endpoint_key::normalize_path(&format!("/api/v1/calls/{ua}"));
        let right = admission_audit_core::endpoint_key::normalize_path(&format!("/api/v1/calls/{ub}"));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn p7_numeric_segments_collapse_identically(a in 0u64..1_000_000, b in 0u64..1_000_000) {
        let left = admission_audit_core::endpoint_key::normalize_path(&format!("/api/v1/calls/{a}"));
        let right = admission_audit_core::endpoint_key::normalize_path(&format!("/api/v1/calls/{b}"));
        prop_assert_eq!(left, right);
    }

    /// P5 — Bucket conservation: admitted requests over any window never
    /// exceed burst + floor(elapsed * rate).
    #[test]
    fn p5_bucket_conservation(rate in 1.0f64..50.0, burst in 1.0f64..20.0, elapsed_ms in 0u64..5_000, attempts in 1usize..200) {
        let rules: HashMap<String, EndpointRateLimit> = [(
            "GET:/x".to_string(),
            EndpointRateLimit { requests_per_second: rate, burst, ..EndpointRateLimit::default() },
        )]
        .into_iter()
        .collect();
        let limiter = Limiter::new(rules);
        let start = Instant::now();
        let end = start + Duration::from_millis(elapsed_ms);

        let admitted = (0..attempts)
            .filter(|_| {
                limiter
                    .admit(AdmissionRequest { method: "GET", path: "/x", client_ip: Some("1.1.1.1"), actor_id: None }, end)
                    .allowed
            })
            .count();

        let bound = burst + (elapsed_ms as f64 / 1000.0) * rate;
        prop_assert!((admitted as f64) <= bound.floor() + 1.0);
    }

    /// P6 — Admission determinism: replaying the same (key, time) sequence
    /// against a fresh registry yields the same admit/deny sequence.
    #[test]
    fn p6_admission_is_deterministic(rate in 1.0f64..20.0, burst in 1.0f64..10.0, offsets_ms in prop::collection::vec(0u64..2_000, 1..50)) {
        let rule = EndpointRateLimit { requests_per_second: rate, burst, ..EndpointRateLimit::default() };
        let rules: HashMap<String, EndpointRateLimit> = [("GET:/x".to_string(), rule)].into_iter().collect();

        let run = |rules: HashMap<String, EndpointRateLimit>| {
            let limiter = Limiter::new(rules);
            let start = Instant::now();
            offsets_ms
                .iter()
                .map(|&ms| {
                    limiter
                        .admit(
                            AdmissionRequest { method: "GET", path: "/x", client_ip: Some("1.1.1.1"), actor_id: None },
                            start + Duration::from_millis(ms),
                        )
                        .allowed
                })
                .collect::<Vec<_>>()
        };

        prop_assert_eq!(run(rules.clone()), run(rules));
    }
}

/// P1 — Sequence monotonicity under concurrent emitters sharing one chain.
#[tokio::test]
async fn p1_sequence_strictly_increases_under_concurrency() {
    let sink = Arc::new(VecAuditSink::new());
    let hash_chain = Arc::new(HashChain::new());
    let key = SecretKey::new(vec![11u8; 32]).unwrap();
    let emitter = Arc::new(Emitter::new(Arc::new(SystemClock), key, hash_chain, sink.clone()));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let emitter = Arc::clone(&emitter);
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                emitter
                    .log(LogRequest::new(
                        EventType::ApiRequest,
                        ActorId::anonymous(),
                        TargetId::default(),
                        format!("worker-{worker}-{i}"),
                        ActionResult::Initiated,
                    ))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut sequences: Vec<u64> = sink.events().await.iter().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    let expected: Vec<u64> = (1..=400).collect();
    assert_eq!(sequences, expected);
}

/// P2 — Hash linkage: the chain recomputed from recorded events matches
/// what the emitter produced, and genesis is 32 zero bytes.
#[tokio::test]
async fn p2_hash_linkage_holds_across_the_chain() {
    let sink = Arc::new(VecAuditSink::new());
    let key = SecretKey::new(vec![22u8; 32]).unwrap();
    let emitter = Emitter::new(Arc::new(SystemClock), key, Arc::new(HashChain::new()), sink.clone());

    for i in 0..20 {
        emitter
            .log(LogRequest::new(
                EventType::ApiRequest,
                ActorId::anonymous(),
                TargetId::default(),
                format!("action-{i}"),
                ActionResult::Initiated,
            ))
            .await
            .unwrap();
    }

    let events = sink.events().await;
    assert_eq!(events[0].previous_hash, [0u8; 32]);
    for window in events.windows(2) {
        assert_eq!(window[1].previous_hash, window[0].event_hash);
    }
}

/// P3 — Signature round-trip: verifies with the signing key, fails with
/// any other key or a single-bit mutation of the hashed bytes.
#[tokio::test]
async fn p3_signature_round_trips_and_rejects_tampering() {
    let sink = Arc::new(VecAuditSink::new());
    let key = SecretKey::new(vec![33u8; 32]).unwrap();
    let other_key = SecretKey::new(vec![44u8; 32]).unwrap();
    let emitter = Emitter::new(Arc::new(SystemClock), key.clone(), Arc::new(HashChain::new()), sink.clone());

    emitter
        .log(LogRequest::new(
            EventType::ApiRequest,
            ActorId::anonymous(),
            TargetId::default(),
            "GET /health",
            ActionResult::Initiated,
        ))
        .await
        .unwrap();

    let event = sink.events().await.into_iter().next().unwrap();
    let signature_bytes = base64::engine::general_purpose::STANDARD
        .decode(&event.signature)
        .unwrap();
    let signature = Signature::compute(&event.event_hash, &key);
    assert_eq!(signature.as_bytes().to_vec(), signature_bytes);
    assert!(signature.verify(&event.event_hash, &key));
    assert!(!signature.verify(&event.event_hash, &other_key));

    let mut mutated_hash = event.event_hash;
    mutated_hash[0] ^= 0x01;
    assert!(!signature.verify(&mutated_hash, &key));
}

/// P9 — Pass-through on disabled: covered at the middleware layer in
/// `src/middleware/mod.rs`'s `disabled_middleware_passes_through_without_auditing`
/// unit test; re-asserted here at the emitter/chain level for completeness
/// is unnecessary since a disabled middleware never calls the emitter at all.
#[test]
fn p9_is_exercised_by_middleware_unit_tests() {
    // See src/middleware/mod.rs. Kept as a documentation anchor so a reader
    // searching for "P9" finds where it is actually tested.
}

/// P10 — Bounded body capture, at the property level: the buffer never
/// exceeds its cap for any payload size, and the client-visible bytes are
/// always the full, untruncated payload.
#[tokio::test]
async fn p10_capture_buffer_never_exceeds_its_cap() {
    use admission_audit_core::response_capture::wrap;
    use axum::body::Body;
    use axum::response::Response;
    use http_body_util::BodyExt;

    for size in [0usize, 1, 10, 63, 64, 65, 1000] {
        let payload = "x".repeat(size);
        let response = Response::builder().status(200).body(Body::from(payload.clone())).unwrap();
        let (wrapped, _meta, handle) = wrap(response, 64);
        let bytes = wrapped.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.len(), size, "client must see every byte");
        assert!(handle.buffered().len() <= 64);
    }
}

#[test]
fn fixed_clock_supports_deterministic_replays_for_p6() {
    let wall = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let clock = FixedClock::new(wall);
    assert_eq!(clock.now_utc(), wall);
}
