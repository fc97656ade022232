//! Audit & admission middleware core for a call-exchange backend.
//!
//! This crate is the request-interception layer that sits between the HTTP
//! transport and business handlers: it enforces admission policy (security
//! checks plus per-key token-bucket rate limits), emits tamper-evident,
//! hash-chained and HMAC-signed audit events, and exposes per-endpoint
//! observability counters. Everything domain-specific (call routing,
//! bidding, billing, persistence, telephony) is deliberately out of scope —
//! this crate consumes only an audit sink, a clock, a signing key, and an
//! actor-identity extractor, all supplied by the integrator.
//!
//! The entry point is [`middleware::MiddlewareState`], applied to an
//! `axum::Router` via [`middleware::apply_to_router`].

pub mod clock;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod emitter;
pub mod endpoint_key;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod perf_monitor;
pub mod response_capture;
pub mod sanitizer;
pub mod security_gate;
pub mod sink;

pub use crypto::signature::SecretKey;
pub use emitter::Emitter;
pub use error::{Error, Result};
pub use middleware::{apply_to_router, MiddlewareState};
