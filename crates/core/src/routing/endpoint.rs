//! Filename-derived endpoint paths for handler-style scripts.

use crate::scripting::path::ScriptPath;

/// Normalize a configured prefix to `/segment[/segment..]` or empty.
///
/// Surrounding whitespace is ignored, a leading `/` is added when missing
/// and trailing slashes are dropped, so `"api/v1/"` becomes `"/api/v1"` and
/// `"/"` becomes `""`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Derive the canonical endpoint for a script.
///
/// `tools/ping.rhai` with prefix `/testapi` mounts at `/testapi/tools/ping`.
///
/// # Examples
///
/// ```
/// use scaffold_core::routing::endpoint::derive_endpoint;
/// use scaffold_core::scripting::path::validate_filename;
///
/// let path = validate_filename("tools/ping.rhai").unwrap();
/// assert_eq!(derive_endpoint(&path, ""), "/tools/ping");
/// assert_eq!(derive_endpoint(&path, "testapi/"), "/testapi/tools/ping");
/// ```
pub fn derive_endpoint(relative: &ScriptPath, prefix: &str) -> String {
    let mut endpoint = normalize_prefix(prefix);
    for segment in relative.segments() {
        endpoint.push('/');
        endpoint.push_str(segment);
    }
    endpoint
}
