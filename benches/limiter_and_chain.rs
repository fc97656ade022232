//! Benchmarks for the two hottest per-request data structures: the
//! rate-limit bucket registry and the audit hash chain.

use admission_audit_core::crypto::hash_chain::HashChain;
use admission_audit_core::domain::identifiers::ChainName;
use admission_audit_core::limiter::{AdmissionRequest, EndpointRateLimit, Limiter};
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn bench_limiter_single_thread(c: &mut Criterion) {
    let mut rules = HashMap::new();
    rules.insert(
        "GET:/api/v1/bids".to_string(),
        EndpointRateLimit {
            requests_per_second: 10_000.0,
            burst: 10_000.0,
            ..EndpointRateLimit::default()
        },
    );
    let limiter = Limiter::new(rules);
    let now = Instant::now();

    c.bench_function("limiter_admit_single_key", |b| {
        b.iter(|| {
            black_box(limiter.admit(
                AdmissionRequest {
                    method: "GET",
                    path: "/api/v1/bids",
                    client_ip: Some("9.9.9.9"),
                    actor_id: None,
                },
                now,
            ))
        })
    });
}

fn bench_limiter_concurrent(c: &mut Criterion) {
    let mut rules = HashMap::new();
    rules.insert(
        "GET:/api/v1/calls/{id}".to_string(),
        EndpointRateLimit {
            requests_per_second: 10_000.0,
            burst: 10_000.0,
            ..EndpointRateLimit::default()
        },
    );

    c.bench_function("limiter_admit_concurrent_4_threads_distinct_ips", |b| {
        b.iter(|| {
            let limiter = Arc::new(Limiter::new(rules.clone()));
            let now = Instant::now();
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let limiter = Arc::clone(&limiter);
                    thread::spawn(move || {
                        let ip = format!("10.0.0.{t}");
                        for _ in 0..100 {
                            let _ = limiter.admit(
                                AdmissionRequest {
                                    method: "GET",
                                    path: "/api/v1/calls/42",
                                    client_ip: Some(&ip),
                                    actor_id: None,
                                },
                                now,
                            );
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

fn bench_hash_chain_append(c: &mut Criterion) {
    let chain = HashChain::new();
    let name = ChainName::global();
    let payload = b"a representative audit event's canonical bytes, roughly this long";

    c.bench_function("hash_chain_append_single_thread", |b| {
        b.iter(|| black_box(chain.append(&name, payload)))
    });
}

fn bench_hash_chain_concurrent(c: &mut Criterion) {
    let payload = b"a representative audit event's canonical bytes, roughly this long";

    c.bench_function("hash_chain_append_concurrent_4_threads", |b| {
        b.iter(|| {
            let chain = Arc::new(HashChain::new());
            let name = ChainName::global();
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let chain = Arc::clone(&chain);
                    let name = name.clone();
                    thread::spawn(move || {
                        for _ in 0..250 {
                            let _ = chain.append(&name, payload);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_limiter_single_thread,
    bench_limiter_concurrent,
    bench_hash_chain_append,
    bench_hash_chain_concurrent
);
criterion_main!(benches);
