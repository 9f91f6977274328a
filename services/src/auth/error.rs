use super::provider::AuthError;
use thiserror::Error;

/// Errors that can occur during token acquisition and refresh.
///
/// Validation failures (`InvalidScopes`, `NoActiveAccount`) fail fast and
/// are never retried. `InteractionRequired` and `RefreshTimeout` are kept
/// distinct from generic provider failures so callers can prompt the user
/// or diagnose a slow network specifically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("no valid scopes were provided")]
    InvalidScopes,

    #[error("no active account found")]
    NoActiveAccount,

    #[error("interactive authentication required - cannot acquire silently: {0}")]
    InteractionRequired(String),

    #[error("token refresh timed out after {seconds}s")]
    RefreshTimeout { seconds: u64 },

    #[error("token acquisition failed: {0}")]
    Acquisition(AuthError),

    #[error("token refresh failed after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

impl TokenError {
    /// Classify a provider error, keeping interaction-required distinct.
    pub(crate) fn from_auth(error: AuthError) -> Self {
        match error {
            AuthError::InteractionRequired(reason) => Self::InteractionRequired(reason),
            other => Self::Acquisition(other),
        }
    }

    pub fn is_interaction_required(&self) -> bool {
        matches!(self, Self::InteractionRequired(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidScopes | Self::NoActiveAccount)
    }
}
