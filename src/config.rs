//! Layered configuration for the middleware core.
//!
//! Loaded the same way the teacher's `Settings` is: defaults, then an
//! optional file per environment, then environment variables, via the
//! `config` crate. The raw deserialized shape uses only primitives (plain
//! numbers/strings/maps) because `config`'s source merging works on those;
//! [`MiddlewareConfig::load`] converts the raw shape into the typed
//! collaborator configs ([`SecurityChecks`], [`PerformanceThresholds`],
//! [`EndpointRateLimit`]) the rest of the crate actually consumes.

use crate::domain::enums::Severity;
use crate::limiter::EndpointRateLimit;
use crate::perf_monitor::PerformanceThresholds;
use crate::security_gate::SecurityChecks;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::time::Duration;

pub use config::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
struct RawSecurityChecks {
    validate_content_type: Option<bool>,
    allowed_content_types: Option<Vec<String>>,
    max_request_size: Option<u64>,
    require_auth: Option<bool>,
    validate_origin: Option<bool>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct RawPerformanceThresholds {
    slow_request_threshold_ms: Option<u64>,
    error_rate_threshold: Option<f64>,
    alert_on_breach: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
struct RawEventFilters {
    #[serde(default)]
    include_endpoints: Vec<String>,
    #[serde(default)]
    exclude_endpoints: Vec<String>,
    min_severity: Option<String>,
    #[serde(default)]
    event_types: Vec<String>,
}

impl Default for RawEventFilters {
    fn default() -> Self {
        Self {
            include_endpoints: Vec::new(),
            exclude_endpoints: default_excluded_endpoints(),
            min_severity: None,
            event_types: Vec::new(),
        }
    }
}

fn default_excluded_endpoints() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/ready".to_string(),
        "/metrics".to_string(),
        "/debug".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone, Default)]
struct RawEndpointRateLimit {
    requests_per_second: f64,
    burst: f64,
    window_ms: Option<u64>,
    #[serde(default)]
    by_ip: bool,
    #[serde(default)]
    by_user: bool,
    #[serde(default = "default_true")]
    by_endpoint: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
struct RawMiddlewareConfig {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_true")]
    audit_requests: bool,
    #[serde(default = "default_true")]
    audit_responses: bool,
    #[serde(default)]
    audit_headers: HashSet<String>,
    #[serde(default)]
    sensitive_keys: HashSet<String>,
    #[serde(default)]
    security_checks: RawSecurityChecks,
    #[serde(default)]
    performance_thresholds: RawPerformanceThresholds,
    #[serde(default)]
    event_filters: RawEventFilters,
    #[serde(default)]
    rate_limits: HashMap<String, RawEndpointRateLimit>,
    #[serde(default = "default_true")]
    continue_on_error: bool,
}

/// Endpoint audit inclusion/exclusion policy, plus the minimum severity and
/// event-type allowlist an event must clear to be emitted.
#[derive(Debug, Clone)]
pub struct EventFilters {
    pub include_endpoints: Vec<String>,
    pub exclude_endpoints: Vec<String>,
    pub min_severity: Severity,
    pub event_types: Vec<String>,
}

impl EventFilters {
    /// Whether `normalized_endpoint` should be audited under these filters.
    /// An exclude match always wins; otherwise an empty include list
    /// audits everything, a non-empty one requires a match.
    pub fn allows(&self, normalized_endpoint: &str) -> bool {
        let path = normalized_endpoint.split_once(':').map(|(_, path)| path).unwrap_or(normalized_endpoint);
        if self.exclude_endpoints.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return false;
        }
        if self.include_endpoints.is_empty() {
            return true;
        }
        self.include_endpoints.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// The fully resolved, immutable configuration snapshot handed to the
/// middleware at construction. Hot updates (e.g. a changed rate limit) go
/// through loading a fresh `MiddlewareConfig` and swapping the whole
/// snapshot, never mutating fields in place.
#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    pub enabled: bool,
    pub audit_requests: bool,
    pub audit_responses: bool,
    pub audit_headers: HashSet<String>,
    pub sensitive_keys: HashSet<String>,
    pub security_checks: SecurityChecks,
    pub performance_thresholds: PerformanceThresholds,
    pub event_filters: EventFilters,
    pub rate_limits: HashMap<String, EndpointRateLimit>,
    pub continue_on_error: bool,
}

impl MiddlewareConfig {
    /// Loads configuration the way the teacher's `Settings::new` does:
    /// built-in defaults, then `config/default.*`, `config/<env>.*`, and
    /// `config/local.*` files (all optional), then `ADMISSION_AUDIT__`
    /// prefixed environment variables, highest precedence last.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("enabled", true)?
            .set_default("audit_requests", true)?
            .set_default("audit_responses", true)?
            .set_default("continue_on_error", true)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("ADMISSION_AUDIT").separator("__"))
            .build()?;

        let raw: RawMiddlewareConfig = config.try_deserialize()?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawMiddlewareConfig) -> Self {
        let security_defaults = SecurityChecks::default();
        let perf_defaults = PerformanceThresholds::default();

        let security_checks = SecurityChecks {
            validate_content_type: raw.security_checks.validate_content_type.unwrap_or(security_defaults.validate_content_type),
            allowed_content_types: raw.security_checks.allowed_content_types.unwrap_or(security_defaults.allowed_content_types),
            max_request_size: raw.security_checks.max_request_size.unwrap_or(security_defaults.max_request_size),
            require_auth: raw.security_checks.require_auth.unwrap_or(security_defaults.require_auth),
            validate_origin: raw.security_checks.validate_origin.unwrap_or(security_defaults.validate_origin),
            allowed_origins: raw.security_checks.allowed_origins.unwrap_or(security_defaults.allowed_origins),
        };

        let performance_thresholds = PerformanceThresholds {
            slow_request_threshold: raw
                .performance_thresholds
                .slow_request_threshold_ms
                .map(Duration::from_millis)
                .unwrap_or(perf_defaults.slow_request_threshold),
            error_rate_threshold: raw.performance_thresholds.error_rate_threshold.unwrap_or(perf_defaults.error_rate_threshold),
            alert_on_breach: raw.performance_thresholds.alert_on_breach.unwrap_or(perf_defaults.alert_on_breach),
        };

        let min_severity = raw
            .event_filters
            .min_severity
            .as_deref()
            .and_then(|s| match s.to_ascii_uppercase().as_str() {
                "LOW" => Some(Severity::Low),
                "MEDIUM" => Some(Severity::Medium),
                "HIGH" => Some(Severity::High),
                "CRITICAL" => Some(Severity::Critical),
                _ => None,
            })
            .unwrap_or(Severity::Low);

        let event_filters = EventFilters {
            include_endpoints: raw.event_filters.include_endpoints,
            exclude_endpoints: raw.event_filters.exclude_endpoints,
            min_severity,
            event_types: raw.event_filters.event_types,
        };

        let rate_limits = raw
            .rate_limits
            .into_iter()
            .map(|(key, rule)| {
                (
                    key,
                    EndpointRateLimit {
                        requests_per_second: rule.requests_per_second,
                        burst: rule.burst,
                        window: rule.window_ms.map(Duration::from_millis).unwrap_or(Duration::from_secs(1)),
                        by_ip: rule.by_ip,
                        by_user: rule.by_user,
                        by_endpoint: rule.by_endpoint,
                    },
                )
            })
            .collect();

        Self {
            enabled: raw.enabled,
            audit_requests: raw.audit_requests,
            audit_responses: raw.audit_responses,
            audit_headers: raw.audit_headers,
            sensitive_keys: raw.sensitive_keys,
            security_checks,
            performance_thresholds,
            event_filters,
            rate_limits,
            continue_on_error: raw.continue_on_error,
        }
    }
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self::from_raw(RawMiddlewareConfig {
            enabled: true,
            audit_requests: true,
            audit_responses: true,
            audit_headers: HashSet::new(),
            sensitive_keys: HashSet::new(),
            security_checks: RawSecurityChecks::default(),
            performance_thresholds: RawPerformanceThresholds::default(),
            event_filters: RawEventFilters::default(),
            rate_limits: HashMap::new(),
            continue_on_error: true,
        })
    }
}
