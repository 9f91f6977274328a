use super::error::TokenError;
use once_cell::sync::Lazy;

/// Scope set used when no explicit scopes are supplied (Microsoft Graph
/// user profile access).
pub static DEFAULT_GRAPH_SCOPES: Lazy<Vec<String>> = Lazy::new(|| vec!["User.Read".to_string()]);

/// A cached access token for one scope set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenInfo {
    /// The access token string.
    pub token: String,
    /// Token expiry as epoch milliseconds.
    pub expires_at_ms: i64,
    /// The scope set the token was acquired for, in request order.
    pub scopes: Vec<String>,
}

/// Kind of token refresh notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenRefreshEventKind {
    Scheduled,
    Success,
    Error,
}

/// Ephemeral refresh notification broadcast to listeners; never stored.
#[derive(Clone, Debug)]
pub struct TokenRefreshEvent {
    pub kind: TokenRefreshEventKind,
    pub scopes: Vec<String>,
    pub timestamp_ms: i64,
    pub error: Option<TokenError>,
}

/// Strip blank entries from a requested scope list.
///
/// Returns `InvalidScopes` when nothing valid remains, which is the
/// fail-fast path every public token operation starts with.
pub fn sanitize_scopes(scopes: &[String]) -> Result<Vec<String>, TokenError> {
    let valid: Vec<String> = scopes
        .iter()
        .map(|scope| scope.trim())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect();

    if valid.is_empty() {
        Err(TokenError::InvalidScopes)
    } else {
        Ok(valid)
    }
}

/// Canonical order-independent identity for a scope set: sorted and
/// comma-joined. Used as the cache and timer map key.
pub fn scope_key(scopes: &[String]) -> String {
    let mut sorted = scopes.to_vec();
    sorted.sort();
    sorted.join(",")
}
