//! Thin demonstration server: wires the middleware in front of a couple of
//! placeholder routes. Real deployments embed [`admission_audit_core`] as a
//! library and supply their own router, sink, and identity extractor; this
//! binary exists so the crate is runnable end to end without one.

use admission_audit_core::config::MiddlewareConfig;
use admission_audit_core::sink::NullAuditSink;
use admission_audit_core::{apply_to_router, MiddlewareState, SecretKey};
use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::env;
use std::sync::Arc;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

fn signing_key() -> Result<SecretKey> {
    let raw = env::var("ADMISSION_AUDIT_SIGNING_KEY")
        .context("ADMISSION_AUDIT_SIGNING_KEY must be set to at least 32 bytes of entropy")?;
    SecretKey::new(raw.into_bytes()).map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = MiddlewareConfig::load().context("loading middleware configuration")?;
    let signing_key = signing_key()?;
    let state = Arc::new(MiddlewareState::new(
        config,
        Arc::new(NullAuditSink),
        Arc::new(admission_audit_core::clock::SystemClock),
        signing_key,
    ));

    let router: Router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/calls", get(|| async { "calls placeholder" }));
    let router = apply_to_router(router, state)
        .layer(TraceLayer::new_for_http())
        .layer(NormalizePathLayer::trim_trailing_slash());

    let addr = env::var("ADMISSION_AUDIT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "admission-audit-core demo server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
