//! The `IdentityExtractor` contract and a header-based reference
//! implementation.
//!
//! Same `async_trait` shape as `AuditSink`/`providers::Provider`: the core
//! depends only on the trait. Resolving JWT/session/API-key precedence is
//! explicitly left to the integrator (see the open-question resolution in
//! the design notes) — this extractor only reads what an upstream auth
//! layer already decided and placed on the request.

use crate::domain::identifiers::{ActorId, TenantId};
use async_trait::async_trait;
use axum::http::request::Parts;
use std::net::IpAddr;

/// Header an upstream auth layer is expected to populate with the already
/// authenticated actor, if any.
pub const AUTHENTICATED_ACTOR_HEADER: &str = "x-authenticated-actor";

/// Header an upstream auth layer is expected to populate with a tenant id.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Resolves the actor (and optional tenant) identity for a request.
#[async_trait]
pub trait IdentityExtractor: Send + Sync {
    async fn extract(&self, parts: &Parts) -> (ActorId, Option<TenantId>);
}

fn client_ip(parts: &Parts) -> Option<IpAddr> {
    parts
        .extensions
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip())
}

/// Reads `x-authenticated-actor`; falls back to `ip:<clientIp>` using the
/// connection's `ConnectInfo`, then to `anonymous`, per the
/// `RequestContext.actorId` resolution rule.
#[derive(Debug, Default)]
pub struct HeaderIdentityExtractor;

#[async_trait]
impl IdentityExtractor for HeaderIdentityExtractor {
    async fn extract(&self, parts: &Parts) -> (ActorId, Option<TenantId>) {
        let actor = parts
            .headers
            .get(AUTHENTICATED_ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| ActorId::try_new(s).ok())
            .or_else(|| {
                client_ip(parts).and_then(|ip| ActorId::try_new(format!("ip:{ip}")).ok())
            })
            .unwrap_or_else(ActorId::anonymous);

        let tenant = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| TenantId::try_new(s).ok());

        (actor, tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ConnectInfo;
    use axum::http::{HeaderValue, Request};
    use std::net::SocketAddr;

    fn parts_with_headers(headers: Vec<(&'static str, &'static str)>) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        parts.extensions.insert(ConnectInfo(
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap(),
        ));
        parts
    }

    #[tokio::test]
    async fn prefers_authenticated_actor_header() {
        let parts = parts_with_headers(vec![(AUTHENTICATED_ACTOR_HEADER, "user-42")]);
        let (actor, _) = HeaderIdentityExtractor.extract(&parts).await;
        assert_eq!(actor.to_string(), "user-42");
    }

    #[tokio::test]
    async fn falls_back_to_client_ip() {
        let parts = parts_with_headers(vec![]);
        let (actor, _) = HeaderIdentityExtractor.extract(&parts).await;
        assert_eq!(actor.to_string(), "ip:127.0.0.1");
    }

    #[tokio::test]
    async fn falls_back_to_anonymous_without_connect_info() {
        let (parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let (actor, _) = HeaderIdentityExtractor.extract(&parts).await;
        assert_eq!(actor.to_string(), "anonymous");
    }

    #[test]
    fn header_value_sanity() {
        let _ = HeaderValue::from_static("user-42");
    }
}
