use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys and other secrets
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// API key sent by the caller, from `X-API-Key` or `Authorization: Bearer`
pub fn provided_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.trim());
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// `true` only when a key is configured and the caller sent the same key
pub fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    match (expected, provided_api_key(headers)) {
        (Some(expected), Some(provided)) => constant_time_compare(expected, provided),
        _ => false,
    }
}
