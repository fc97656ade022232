//! Normalizes `METHOD + path` into a low-cardinality key for rate limiting
//! and metric labels, collapsing UUID and numeric path segments.

use uuid::Uuid;

const COLLAPSED_SEGMENT: &str = "{id}";

fn is_collapsible(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    Uuid::parse_str(segment).is_ok() || segment.parse::<u64>().is_ok()
}

/// Splits `path` on `/`, replaces any UUID or base-10 integer segment with
/// `{id}`, and rejoins. Preserves leading/trailing slashes.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_collapsible(segment) {
                COLLAPSED_SEGMENT
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns `"<METHOD>:<normalized-path>"`.
pub fn normalize(method: &str, path: &str) -> String {
    format!("{}:{}", method.to_uppercase(), normalize_path(path))
}
