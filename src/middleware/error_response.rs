//! The wire shape of a security/admission failure response.
//!
//! Adapted from `proxy/error_response.rs`'s `ErrorResponse` (a typed body
//! plus a request-id header) into the nested `{"error": {...}}` envelope
//! this core's data model specifies.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: &'static str,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Builds the 403 response for a `SecurityGate` denial. The wire `code` is
/// always the fixed tag `SECURITY_VIOLATION`; the specific reason (e.g.
/// `INVALID_CONTENT_TYPE`) appears only in `details` and in the paired
/// `SECURITY_INCIDENT` audit event's metadata.
pub fn security_violation_response(details: String, request_id: &str) -> Response {
    render(
        StatusCode::FORBIDDEN,
        ErrorBody {
            code: "SECURITY_VIOLATION",
            message: "Request blocked by security policy",
            details,
        },
        request_id,
        &[],
    )
}

/// Builds the 503 response returned when `continueOnError` is `false` and
/// the audit emitter could not record the request-admission event. Fails
/// closed: a request this core cannot prove it audited is not forwarded to
/// the handler.
pub fn audit_unavailable_response(request_id: &str) -> Response {
    render(
        StatusCode::SERVICE_UNAVAILABLE,
        ErrorBody {
            code: "AUDIT_UNAVAILABLE",
            message: "Request could not be audited and continueOnError is disabled",
            details: "audit sink rejected the request-admission event".to_string(),
        },
        request_id,
        &[],
    )
}

/// Builds the 429 response for a `Limiter` denial, with the rate-limit
/// headers the data model requires.
pub fn rate_limit_response(limit: Option<f64>, retry_after_secs: u64, request_id: &str) -> Response {
    let limit_header = limit.map(|l| l.to_string()).unwrap_or_else(|| "0".to_string());
    render(
        StatusCode::TOO_MANY_REQUESTS,
        ErrorBody {
            code: "RATE_LIMIT_EXCEEDED",
            message: "Too many requests",
            details: format!("retry after {retry_after_secs}s"),
        },
        request_id,
        &[
            ("x-ratelimit-limit", limit_header),
            ("x-ratelimit-remaining", "0".to_string()),
            ("retry-after", retry_after_secs.to_string()),
        ],
    )
}

fn render(status: StatusCode, body: ErrorBody, request_id: &str, extra_headers: &[(&'static str, String)]) -> Response {
    let mut response = (status, Json(ErrorEnvelope { error: body })).into_response();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    for (name, value) in extra_headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            response.headers_mut().insert(*name, value);
        }
    }
    response
}
