use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A signed-in account as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Provider-assigned stable account identifier.
    pub home_account_id: String,
    /// User principal name (usually an email address).
    pub username: String,
    /// Display name, when the provider supplies one.
    pub name: Option<String>,
    /// Raw ID token for the account session, when available.
    pub id_token: Option<String>,
}

/// Outcome of a successful token acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// The access token string (a JWT for Entra ID).
    pub access_token: String,
    /// Expiry as epoch milliseconds; `0` when the provider omits it.
    pub expires_at_ms: i64,
    /// Scopes the token was granted for.
    pub scopes: Vec<String>,
}

/// Errors surfaced by the identity provider.
///
/// `InteractionRequired` is its own variant because callers route on it:
/// the primary acquisition path falls back to a popup instead of failing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("network error during token acquisition: {0}")]
    Network(String),
}

/// Session lifecycle signals emitted by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    LoginSuccess,
    LogoutSuccess,
}

pub type SessionEventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Surface of the external identity library (the MSAL analog).
///
/// The token service is written entirely against this trait; production
/// wiring supplies an implementation backed by the real provider SDK, tests
/// supply mocks.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// The currently active signed-in account, if any.
    fn active_account(&self) -> Option<AccountInfo>;

    /// Obtain a token without user interaction, typically from the
    /// provider's session cache.
    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        account: &AccountInfo,
    ) -> Result<AuthenticationResult, AuthError>;

    /// Obtain a token through a user-facing prompt.
    async fn acquire_token_popup(
        &self,
        scopes: &[String],
    ) -> Result<AuthenticationResult, AuthError>;

    /// Subscribe to login/logout lifecycle signals.
    fn add_event_callback(&self, callback: SessionEventCallback);
}
