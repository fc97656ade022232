//! Stateless pre-admission checks run before the inner handler.
//!
//! Grounded on `proxy/error_response.rs`'s `ProxyError`/`ErrorResponse`
//! split (a typed failure enum, rendered by the middleware into the wire
//! envelope) and the content-type/size checks scattered through
//! `proxy/middleware.rs`, consolidated here into one synchronous gate.

use axum::http::HeaderMap;
use thiserror::Error;

/// One thing the gate checked and rejected. Carries enough detail for the
/// middleware to build both the `details` field of the JSON error body and
/// the `SECURITY_INCIDENT` audit metadata, without ever including anything
/// beyond the triggering value itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityViolation {
    #[error("content type {0} not allowed")]
    InvalidContentType(String),
    #[error("request size {size} exceeds maximum {max}")]
    RequestTooLarge { size: u64, max: u64 },
    #[error("origin {0} not allowed")]
    InvalidOrigin(String),
}

impl SecurityViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidContentType(_) => "INVALID_CONTENT_TYPE",
            Self::RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            Self::InvalidOrigin(_) => "INVALID_ORIGIN",
        }
    }
}

/// The `securityChecks` configuration block. `requireAuth` is accepted for
/// schema parity but never enforced here — authentication is delegated to
/// an upstream collaborator, per the design notes.
#[derive(Debug, Clone)]
pub struct SecurityChecks {
    pub validate_content_type: bool,
    pub allowed_content_types: Vec<String>,
    pub max_request_size: u64,
    pub require_auth: bool,
    pub validate_origin: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityChecks {
    fn default() -> Self {
        Self {
            validate_content_type: false,
            allowed_content_types: vec!["application/json".to_string()],
            max_request_size: 10 * 1024 * 1024,
            require_auth: false,
            validate_origin: false,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

fn content_type_base(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}

/// Stateless checker driven entirely by configuration and the one
/// request's headers/declared length; holds no per-request state itself.
#[derive(Debug, Clone, Default)]
pub struct SecurityGate {
    checks: SecurityChecks,
}

impl SecurityGate {
    pub fn new(checks: SecurityChecks) -> Self {
        Self { checks }
    }

    /// Runs every enabled check in order, returning the first violation.
    /// `has_body` tells the gate whether a missing/empty content type is
    /// even meaningful to evaluate (a `GET` with no body should never be
    /// rejected for lacking a content type).
    pub fn check(&self, headers: &HeaderMap, declared_length: Option<u64>, has_body: bool) -> Result<(), SecurityViolation> {
        if self.checks.validate_content_type && has_body {
            let content_type = headers
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(content_type_base)
                .unwrap_or("");
            let allowed = self
                .checks
                .allowed_content_types
                .iter()
                .any(|allowed| allowed == "*" || allowed == content_type);
            if !allowed {
                return Err(SecurityViolation::InvalidContentType(content_type.to_string()));
            }
        }

        if let Some(size) = declared_length {
            if size > self.checks.max_request_size {
                return Err(SecurityViolation::RequestTooLarge {
                    size,
                    max: self.checks.max_request_size,
                });
            }
        }

        if self.checks.validate_origin {
            if let Some(origin) = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
                let allowed = self
                    .checks
                    .allowed_origins
                    .iter()
                    .any(|allowed| allowed == "*" || allowed == origin);
                if !allowed {
                    return Err(SecurityViolation::InvalidOrigin(origin.to_string()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn rejects_disallowed_content_type_when_body_present() {
        let gate = SecurityGate::new(SecurityChecks {
            validate_content_type: true,
            allowed_content_types: vec!["application/json".to_string()],
            ..Default::default()
        });
        let headers = headers_with(&[("content-type", "text/xml")]);
        let result = gate.check(&headers, None, true);
        assert_eq!(
            result,
            Err(SecurityViolation::InvalidContentType("text/xml".to_string()))
        );
    }

    #[test]
    fn ignores_content_type_when_no_body_expected() {
        let gate = SecurityGate::new(SecurityChecks {
            validate_content_type: true,
            allowed_content_types: vec!["application/json".to_string()],
            ..Default::default()
        });
        let headers = headers_with(&[("content-type", "text/xml")]);
        assert!(gate.check(&headers, None, false).is_ok());
    }

    #[test]
    fn allows_content_type_with_charset_suffix() {
        let gate = SecurityGate::new(SecurityChecks {
            validate_content_type: true,
            allowed_content_types: vec!["application/json".to_string()],
            ..Default::default()
        });
        let headers = headers_with(&[("content-type", "application/json; charset=utf-8")]);
        assert!(gate.check(&headers, None, true).is_ok());
    }

    #[test]
    fn rejects_request_too_large() {
        let gate = SecurityGate::new(SecurityChecks {
            max_request_size: 100,
            ..Default::default()
        });
        let headers = HeaderMap::new();
        let result = gate.check(&headers, Some(200), false);
        assert_eq!(result, Err(SecurityViolation::RequestTooLarge { size: 200, max: 100 }));
    }

    #[test]
    fn rejects_disallowed_origin() {
        let gate = SecurityGate::new(SecurityChecks {
            validate_origin: true,
            allowed_origins: vec!["https://trusted.example".to_string()],
            ..Default::default()
        });
        let headers = headers_with(&[("origin", "https://evil.example")]);
        assert_eq!(
            gate.check(&headers, None, false),
            Err(SecurityViolation::InvalidOrigin("https://evil.example".to_string()))
        );
    }

    #[test]
    fn wildcard_origin_allows_everything() {
        let gate = SecurityGate::new(SecurityChecks {
            validate_origin: true,
            allowed_origins: vec!["*".to_string()],
            ..Default::default()
        });
        let headers = headers_with(&[("origin", "https://anything.example")]);
        assert!(gate.check(&headers, None, false).is_ok());
    }

    #[test]
    fn missing_origin_header_is_never_rejected() {
        let gate = SecurityGate::new(SecurityChecks {
            validate_origin: true,
            allowed_origins: vec!["https://trusted.example".to_string()],
            ..Default::default()
        });
        assert!(gate.check(&HeaderMap::new(), None, false).is_ok());
    }

    #[test]
    fn default_gate_passes_everything() {
        let gate = SecurityGate::default();
        let headers = headers_with(&[("content-type", "text/xml"), ("origin", "https://anything")]);
        assert!(gate.check(&headers, Some(u64::MAX), true).is_ok());
    }
}
