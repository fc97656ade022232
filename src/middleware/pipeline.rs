//! The per-request pipeline: `{SecurityGate, Limiter} → inner handler →
//! ResponseCapture → Emitter`, with metrics and the perf monitor tapped on
//! every exit path.
//!
//! Grounded on `proxy/middleware.rs`'s `auth_middleware`/
//! `request_id_middleware` shape (`State<Arc<...>>` plus `Request`/`Next`,
//! request-id propagation into both the request and the response) and
//! `proxy/middleware_stack.rs`'s builder, adapted to this core's own
//! collaborators instead of auth/proxying.

use super::error_response::{audit_unavailable_response, rate_limit_response, security_violation_response};
use super::MiddlewareState;
use crate::domain::enums::{ActionResult, DataClass, EventType, Severity};
use crate::domain::identifiers::{ActorId, RequestId, TargetId};
use crate::emitter::LogRequest;
use crate::limiter::AdmissionRequest;
use crate::response_capture;
use crate::sanitizer;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_BODY_AUDIT_BYTES: usize = 64 * 1024;
const TARGET_SEGMENTS: [&str; 3] = ["calls", "bids", "accounts"];

fn resolve_request_id(headers: &HeaderMap) -> RequestId {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::parse)
        .unwrap_or_default()
}

fn resolve_client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return Some(real_ip.to_string());
        }
    }
    connect_info.map(|info| info.0.ip().to_string())
}

fn resolve_session_id(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = headers.get("cookie").and_then(|v| v.to_str().ok()) {
        for part in cookie.split(';') {
            if let Some((name, value)) = part.trim().split_once('=') {
                if name == "session_id" {
                    return Some(value.to_string());
                }
            }
        }
    }
    headers.get("x-session-id").and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Extracts the path segment following `calls`, `bids`, or `accounts`;
/// falls back to the whole path when none of those appear.
fn resolve_target_id(path: &str) -> TargetId {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for (i, segment) in segments.iter().enumerate() {
        if TARGET_SEGMENTS.contains(segment) {
            if let Some(next) = segments.get(i + 1) {
                if let Ok(target) = TargetId::try_new(*next) {
                    return target;
                }
            }
        }
    }
    TargetId::try_new(path).unwrap_or_default()
}

fn selected_headers(headers: &HeaderMap, names: &std::collections::HashSet<String>) -> Value {
    let mut map = serde_json::Map::new();
    for name in names {
        if let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
            map.insert(name.clone(), json!(value));
        }
    }
    Value::Object(map)
}

fn header_str<'a>(headers: &'a HeaderMap, name: axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// The full middleware entry point, suitable for
/// `axum::middleware::from_fn_with_state`.
#[instrument(skip(state, request, next), fields(method = %request.method(), path = %request.uri().path()))]
pub async fn audit_middleware(State(state): State<Arc<MiddlewareState>>, request: Request, next: Next) -> Response {
    if !state.config.enabled {
        return next.run(request).await;
    }

    let start = state.clock.monotonic();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let endpoint_key = crate::endpoint_key::normalize(&method, &path);

    let request_id = resolve_request_id(request.headers());
    let connect_info = request.extensions().get::<ConnectInfo<SocketAddr>>().cloned();
    let client_ip = resolve_client_ip(request.headers(), connect_info.as_ref());
    let session_id = resolve_session_id(request.headers());
    let target_id = resolve_target_id(&path);
    let declared_length = header_str(request.headers(), axum::http::header::CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());
    let content_type = header_str(request.headers(), axum::http::header::CONTENT_TYPE).map(str::to_string);
    let has_body = !matches!(request.method().as_str(), "GET" | "HEAD" | "OPTIONS");

    let (parts, body) = request.into_parts();
    let (actor_id, _tenant_id) = state.identity_extractor.extract(&parts).await;
    let request = Request::from_parts(parts, body);

    run_pipeline(
        state,
        request,
        next,
        PipelineContext {
            request_id,
            client_ip,
            session_id,
            actor_id,
            target_id,
            endpoint_key,
            method,
            path,
            query,
            declared_length,
            content_type,
            has_body,
            start,
        },
    )
    .await
}

struct PipelineContext {
    request_id: RequestId,
    client_ip: Option<String>,
    session_id: Option<String>,
    actor_id: ActorId,
    target_id: TargetId,
    endpoint_key: String,
    method: String,
    path: String,
    query: String,
    declared_length: Option<u64>,
    content_type: Option<String>,
    has_body: bool,
    start: Instant,
}

async fn run_pipeline(state: Arc<MiddlewareState>, request: Request, next: Next, ctx: PipelineContext) -> Response {
    let security_result = state.security_gate.check(request.headers(), ctx.declared_length, ctx.has_body);
    if let Err(violation) = security_result {
        let metadata = json!({
            "method": ctx.method,
            "path": ctx.path,
            "clientIp": ctx.client_ip,
            "violationCode": violation.code(),
            "violation": violation.to_string(),
        });
        emit_best_effort(
            &state,
            LogRequest::new(
                EventType::SecurityIncident,
                ctx.actor_id.clone(),
                ctx.target_id.clone(),
                format!("{} {}", ctx.method, ctx.path),
                ActionResult::Blocked,
            )
            .with_severity(Severity::High)
            .with_data_classes(BTreeSet::from([DataClass::Security]))
            .with_metadata(metadata),
        )
        .await;

        let duration = state.clock.monotonic().saturating_duration_since(ctx.start);
        state.metrics.record_request(&ctx.method, &ctx.endpoint_key, 403, duration.as_micros() as u64);
        record_perf_and_maybe_alert(&state, &ctx.endpoint_key, duration, true);
        return security_violation_response(violation.to_string(), &ctx.request_id.to_string());
    }

    let admission = state.limiter.admit(
        AdmissionRequest {
            method: &ctx.method,
            path: &ctx.path,
            client_ip: ctx.client_ip.as_deref(),
            actor_id: Some(ctx.actor_id.as_ref()),
        },
        state.clock.monotonic(),
    );
    if !admission.allowed {
        let metadata = json!({
            "method": ctx.method,
            "path": ctx.path,
            "retryAfterSecs": admission.retry_after_secs,
        });
        emit_best_effort(
            &state,
            LogRequest::new(
                EventType::RateLimitExceeded,
                ctx.actor_id.clone(),
                ctx.target_id.clone(),
                format!("{} {}", ctx.method, ctx.path),
                ActionResult::Exceeded,
            )
            .with_metadata(metadata),
        )
        .await;

        let duration = state.clock.monotonic().saturating_duration_since(ctx.start);
        state.metrics.record_request(&ctx.method, &ctx.endpoint_key, 429, duration.as_micros() as u64);
        record_perf_and_maybe_alert(&state, &ctx.endpoint_key, duration, true);
        return rate_limit_response(admission.limit, admission.retry_after_secs, &ctx.request_id.to_string());
    }

    let audited = state.config.audit_requests && state.config.event_filters.allows(&ctx.endpoint_key);

    let request = if audited {
        let (parts, body) = request.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => Default::default(),
        };

        let request_body = if is_json_content_type(ctx.content_type.as_deref())
            && ctx.declared_length.is_some_and(|len| len > 0 && len < MAX_BODY_AUDIT_BYTES)
        {
            serde_json::from_slice::<Value>(&body_bytes)
                .ok()
                .map(|value| sanitizer::sanitize(&value, &state.config.sensitive_keys))
        } else {
            None
        };

        let metadata = json!({
            "method": ctx.method,
            "path": ctx.path,
            "query": ctx.query,
            "clientIp": ctx.client_ip,
            "sessionId": ctx.session_id,
            "contentType": ctx.content_type,
            "userAgent": header_str(&parts.headers, axum::http::header::USER_AGENT),
            "referer": header_str(&parts.headers, axum::http::header::REFERER),
            "declaredContentLength": ctx.declared_length,
            "headers": selected_headers(&parts.headers, &state.config.audit_headers),
            "requestBody": request_body,
        });

        let audited_ok = emit_best_effort(
            &state,
            LogRequest::new(
                EventType::ApiRequest,
                ctx.actor_id.clone(),
                ctx.target_id.clone(),
                format!("{} {}", ctx.method, ctx.path),
                ActionResult::Initiated,
            )
            .with_metadata(metadata),
        )
        .await;

        if !audited_ok && !state.config.continue_on_error {
            state.metrics.record_request(&ctx.method, &ctx.endpoint_key, 503, elapsed_micros(&state, ctx.start));
            return audit_unavailable_response(&ctx.request_id.to_string());
        }

        Request::from_parts(parts, axum::body::Body::from(body_bytes))
    } else {
        request
    };

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration = state.clock.monotonic().saturating_duration_since(ctx.start);

    let response_content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (response, meta, capture) = response_capture::wrap(response, response_capture::DEFAULT_CAPTURE_CAP);

    if audited && state.config.audit_responses {
        let state = Arc::clone(&state);
        let ctx_method = ctx.method.clone();
        let ctx_path = ctx.path.clone();
        let actor_id = ctx.actor_id.clone();
        let target_id = ctx.target_id.clone();
        let content_type = response_content_type.clone();
        tokio::spawn(async move {
            capture.wait_until_complete().await;
            let body = capture.buffered();
            let response_body = if is_json_content_type(content_type.as_deref()) && !body.is_empty() && body.len() < MAX_BODY_AUDIT_BYTES {
                serde_json::from_slice::<Value>(&body)
                    .ok()
                    .map(|value| sanitizer::sanitize(&value, &state.config.sensitive_keys))
            } else {
                None
            };

            let metadata = json!({
                "status": meta.status.as_u16(),
                "responseSize": body.len(),
                "durationMicros": duration.as_micros() as u64,
                "responseContentType": content_type,
                "responseBody": response_body,
                "truncated": capture.truncated(),
            });

            emit_best_effort(
                &state,
                LogRequest::new(
                    EventType::ApiResponse,
                    actor_id,
                    target_id,
                    format!("{ctx_method} {ctx_path}"),
                    ActionResult::from_status(meta.status.as_u16()),
                )
                .with_metadata(metadata),
            )
            .await;
        });
    }

    state.metrics.record_request(&ctx.method, &ctx.endpoint_key, status, duration.as_micros() as u64);
    record_perf_and_maybe_alert(&state, &ctx.endpoint_key, duration, status >= 400);

    let mut response = response.into_response();
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Submits one audit event, logging and counting any failure. Returns
/// whether emission succeeded so call sites that can still affect the
/// response (i.e. anything before `next.run`) can honor `continueOnError`.
async fn emit_best_effort(state: &MiddlewareState, request: LogRequest) -> bool {
    if let Err(error) = state.emitter.log(request).await {
        warn!(%error, "audit emission failed");
        state.metrics.record_error("emitter_failure");
        return false;
    }
    true
}

fn elapsed_micros(state: &MiddlewareState, start: Instant) -> u64 {
    state.clock.monotonic().saturating_duration_since(start).as_micros() as u64
}

/// Taps the perf monitor on an exit path — success or denial alike — and,
/// if it reports a breach, emits a `SYSTEM_FAILURE` audit event in the
/// background.
fn record_perf_and_maybe_alert(state: &Arc<MiddlewareState>, endpoint_key: &str, duration: Duration, is_error: bool) {
    let alert = state.perf_monitor.record(endpoint_key, duration, is_error);
    if alert != crate::perf_monitor::AlertDecision::None {
        let state = Arc::clone(state);
        let endpoint_key = endpoint_key.to_string();
        tokio::spawn(async move {
            emit_best_effort(
                &state,
                LogRequest::new(
                    EventType::SystemFailure,
                    ActorId::anonymous(),
                    TargetId::default(),
                    format!("performance threshold breach on {endpoint_key}"),
                    ActionResult::ServerError,
                )
                .with_severity(Severity::High)
                .with_metadata(json!({ "endpoint": endpoint_key })),
            )
            .await;
        });
    }
}
