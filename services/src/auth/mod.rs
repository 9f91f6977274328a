//! Authentication and token lifecycle.
//!
//! The [`IdentityProvider`] trait abstracts the actual identity platform;
//! [`TokenService`] layers caching, proactive refresh scheduling, and
//! interactive fallback on top of it.

pub mod config;
pub mod error;
pub mod jwt;
pub mod provider;
pub mod token_service;
pub mod types;

pub use config::{TokenRefreshConfig, TokenRefreshConfigUpdate};
pub use error::TokenError;
pub use provider::{
    AccountInfo, AuthError, AuthenticationResult, IdentityProvider, SessionEvent,
    SessionEventCallback,
};
pub use token_service::TokenService;
pub use types::{
    DEFAULT_GRAPH_SCOPES, TokenInfo, TokenRefreshEvent, TokenRefreshEventKind, sanitize_scopes,
    scope_key,
};
