//! Recursive redaction of sensitive keys in arbitrary JSON-shaped data.
//!
//! The teacher has no redaction logic of its own (its audit model hashes
//! content instead of redacting it); this is grounded in the pack's
//! redaction-corpus shape: walk the tree, replace values under a sensitive
//! key, operate on a defensive copy.

use serde_json::Value;
use std::collections::HashSet;

pub const REDACTED: &str = "[REDACTED]";

/// The default set of case-insensitive substrings that mark a key's value
/// as sensitive.
pub fn default_sensitive_keys() -> HashSet<String> {
    [
        "password",
        "token",
        "secret",
        "key",
        "auth",
        "credential",
        "api_key",
        "bearer",
        "oauth",
        "phone_number",
        "caller_id",
        "called_number",
        "recording_url",
        "email",
        "ssn",
        "credit_card",
        "routing_number",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn is_sensitive(key: &str, sensitive: &HashSet<String>) -> bool {
    let key = key.to_lowercase();
    sensitive.iter().any(|marker| key.contains(marker.as_str()))
}

/// Returns a sanitized copy of `value`. The input is never mutated. Values
/// nested under a sensitive key are replaced wholesale with `[REDACTED]`
/// without being recursed into, so a sensitive object's children never
/// leak even if one of them would otherwise look benign.
pub fn sanitize(value: &Value, sensitive: &HashSet<String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive(key, sensitive) {
                    out.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key.clone(), sanitize(val, sensitive));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| sanitize(item, sensitive)).collect())
        }
        primitive => primitive.clone(),
    }
}
