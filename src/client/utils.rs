//! Utility functions for the CouchDB client.
//!
//! - Retry classification and exponential backoff for idempotent requests
//! - `ETag` unquoting for revision lookups
//! - Basic auth header encoding shared by the request client and the feed

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;

/// Check if status code indicates retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Exponential backoff delay calculation
///
/// `base_ms * 2^attempt`, with the exponent capped at 10.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// Strip the surrounding quotes CouchDB puts on `ETag` values.
///
/// Returns `None` for an empty header.
pub fn strip_etag(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let unquoted = raw.strip_prefix('"').unwrap_or(raw);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
    Some(unquoted.to_string())
}

/// `Authorization` header value for HTTP basic auth.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}
