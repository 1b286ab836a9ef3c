//! # Authentication Module
//!
//! Optional API key authentication for the provgraph HTTP API.
//!
//! ## Configuration
//!
//! - `PROVGRAPH_API_KEY`: If set, all requests except `/health` require this key
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

// =============================================================================
// API KEY AUTHENTICATION
// =============================================================================

/// `PROVGRAPH_API_KEY` when set and non-empty; `None` disables authentication.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("PROVGRAPH_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// Constant-time key comparison.
///
/// Both keys are padded to the same length so the comparison always runs
/// over the same number of bytes; the length check happens afterwards.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let len = provided.len().max(expected.len());
    let mut a = vec![0u8; len];
    let mut b = vec![0u8; len];
    a[..provided.len()].copy_from_slice(provided);
    b[..expected.len()].copy_from_slice(expected);
    let equal: bool = a.ct_eq(&b).into();
    equal && provided.len() == expected.len()
}

/// API key authentication middleware.
///
/// `/health` is always allowed. Other routes need `Authorization: Bearer <key>`
/// (or the raw key) when `PROVGRAPH_API_KEY` is set.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(key) if keys_match(key.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                "Authentication failed: invalid API key"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_match() {
        assert!(keys_match(b"secret-key", b"secret-key"));
    }

    #[test]
    fn prefix_does_not_match() {
        assert!(!keys_match(b"secret", b"secret-key"));
        assert!(!keys_match(b"secret-key-extra", b"secret-key"));
    }

    #[test]
    fn empty_key_does_not_match() {
        assert!(!keys_match(b"", b"secret-key"));
    }
}
