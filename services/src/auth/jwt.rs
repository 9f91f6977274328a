//! Client-side JWT inspection helpers.
//!
//! These decode without verifying signatures; they exist for expiry checks
//! and claim display only, never for validation.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

/// Decode the payload segment of a JWT into a claims object.
///
/// Tolerant of malformed input: any structural, base64, or JSON failure
/// yields `None`.
pub fn decode_jwt_token(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Alias for [`decode_jwt_token`], matching the service surface.
pub fn token_claims(token: &str) -> Option<serde_json::Value> {
    decode_jwt_token(token)
}

/// The `exp` claim as epoch seconds, when present and numeric.
pub fn expiry_epoch_secs(token: &str) -> Option<i64> {
    decode_jwt_token(token)?.get("exp")?.as_i64()
}

/// Whether the token's `exp` claim is strictly in the past.
///
/// Undecodable tokens and tokens without an expiry count as expired.
pub fn is_token_expired(token: &str) -> bool {
    match expiry_epoch_secs(token) {
        Some(exp) => exp < chrono::Utc::now().timestamp(),
        None => true,
    }
}

/// Bearer authorization headers for authenticated JSON calls.
///
/// A token that is not a valid header value (control characters) is a
/// caller bug; the authorization header is omitted and a warning logged
/// rather than panicking.
pub fn create_auth_header(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::try_from(format!("Bearer {token}")) {
        Ok(value) => {
            headers.insert(AUTHORIZATION, value);
        }
        Err(_) => {
            log::warn!("Access token contains characters invalid in an HTTP header; omitting authorization header");
        }
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build an unsigned JWT with the given payload claims.
    pub fn make_jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.signature")
    }

    /// A JWT whose `exp` claim is `offset_secs` from now.
    pub fn make_jwt_expiring_in(offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + offset_secs;
        make_jwt(&serde_json::json!({ "exp": exp, "aud": "test" }))
    }
}
