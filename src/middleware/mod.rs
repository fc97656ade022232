//! Public entry point: bundles every collaborator into one `MiddlewareState`
//! and exposes the single factory the core's external interface promises —
//! `(config, sink, clock, keyProvider, identityExtractor)` in, an
//! `axum::middleware::from_fn_with_state`-compatible layer out.
//!
//! Grounded on `proxy/middleware_stack.rs`'s `ProxyMiddlewareStack` builder
//! (`State<Arc<AuthConfig>>` plumbed into `from_fn_with_state`), generalized
//! to this core's larger collaborator set.

pub mod error_response;
pub mod pipeline;

use crate::clock::Clock;
use crate::config::MiddlewareConfig;
use crate::crypto::hash_chain::HashChain;
use crate::crypto::signature::SecretKey;
use crate::emitter::Emitter;
use crate::identity::{HeaderIdentityExtractor, IdentityExtractor};
use crate::limiter::{EndpointRateLimit, Limiter};
use crate::metrics::Metrics;
use crate::perf_monitor::PerfMonitor;
use crate::security_gate::SecurityGate;
use crate::sink::AuditSink;
use axum::middleware::from_fn_with_state;
use axum::Router;
use std::sync::Arc;

/// Every collaborator the pipeline needs for the lifetime of a process.
/// Constructed once at startup and shared via `Arc` across all requests;
/// nothing here is mutated after construction (configuration hot-reload
/// means building a new `MiddlewareState` and swapping it in, never
/// mutating fields of an existing one).
pub struct MiddlewareState {
    pub config: MiddlewareConfig,
    pub clock: Arc<dyn Clock>,
    pub identity_extractor: Arc<dyn IdentityExtractor>,
    pub security_gate: SecurityGate,
    pub limiter: Arc<Limiter>,
    pub emitter: Arc<Emitter>,
    pub metrics: Metrics,
    pub perf_monitor: Arc<PerfMonitor>,
}

impl MiddlewareState {
    /// Builds the full collaborator set from a resolved config, a sink, a
    /// clock, and a signing key, using a `HeaderIdentityExtractor` as the
    /// default `IdentityExtractor`. Use [`MiddlewareState::with_identity_extractor`]
    /// to plug in a different one.
    pub fn new(config: MiddlewareConfig, sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>, signing_key: SecretKey) -> Self {
        Self::with_identity_extractor(config, sink, clock, signing_key, Arc::new(HeaderIdentityExtractor))
    }

    pub fn with_identity_extractor(
        config: MiddlewareConfig,
        sink: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        signing_key: SecretKey,
        identity_extractor: Arc<dyn IdentityExtractor>,
    ) -> Self {
        let security_gate = SecurityGate::new(config.security_checks.clone());
        let limiter = Arc::new(Limiter::new(config.rate_limits.clone()));
        let sweep_window = config
            .rate_limits
            .values()
            .map(|rule| rule.window)
            .min()
            .unwrap_or_else(|| EndpointRateLimit::default().window);
        crate::limiter::spawn_eviction_sweep(Arc::clone(&limiter), sweep_window);
        let hash_chain = Arc::new(HashChain::new());
        let emitter = Arc::new(
            Emitter::new(Arc::clone(&clock), signing_key, hash_chain, sink).with_sensitive_keys(config.sensitive_keys.iter().cloned()),
        );
        let perf_monitor = Arc::new(PerfMonitor::new(Arc::clone(&clock), config.performance_thresholds));

        Self {
            config,
            clock,
            identity_extractor,
            security_gate,
            limiter,
            emitter,
            metrics: Metrics::new(),
            perf_monitor,
        }
    }
}

/// Applies the middleware to `router` as the outermost layer, matching the
/// teacher's `ProxyMiddlewareStack::apply_to_router` convenience method. Put
/// this last in a layer chain so every request — including ones the
/// `SecurityGate` rejects — is observed.
pub fn apply_to_router<S>(router: Router<S>, state: Arc<MiddlewareState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(from_fn_with_state(state, pipeline::audit_middleware))
}
