use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use services::auth::{
    AccountInfo, AuthError, AuthenticationResult, IdentityProvider, SessionEvent,
    SessionEventCallback, TokenError, TokenRefreshConfig, TokenRefreshEventKind, TokenService,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// Helper module for token lifecycle testing
mod token_helpers {
    use super::*;

    /// Build an unsigned JWT whose `exp` claim is `offset_secs` from now.
    /// A nonce claim keeps tokens minted in the same second distinct.
    pub fn make_jwt_expiring_in(offset_secs: i64) -> String {
        static NONCE: AtomicU32 = AtomicU32::new(0);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let exp = chrono::Utc::now().timestamp() + offset_secs;
        let nonce = NONCE.fetch_add(1, Ordering::SeqCst);
        let payload = URL_SAFE_NO_PAD
            .encode(format!(r#"{{"exp":{exp},"aud":"test","nonce":{nonce}}}"#).as_bytes());
        format!("{header}.{payload}.signature")
    }

    pub fn test_account() -> AccountInfo {
        AccountInfo {
            home_account_id: "integration-home".to_string(),
            username: "integration@example.com".to_string(),
            name: Some("Integration User".to_string()),
            id_token: Some("integration-id-token".to_string()),
        }
    }

    /// Identity provider double that counts calls and can be signed out.
    pub struct CountingProvider {
        pub account: Mutex<Option<AccountInfo>>,
        pub silent_calls: AtomicU32,
        pub popup_calls: AtomicU32,
        pub fail_silent: Mutex<bool>,
        pub callbacks: Mutex<Vec<SessionEventCallback>>,
    }

    impl CountingProvider {
        pub fn signed_in() -> Arc<Self> {
            Arc::new(Self {
                account: Mutex::new(Some(test_account())),
                silent_calls: AtomicU32::new(0),
                popup_calls: AtomicU32::new(0),
                fail_silent: Mutex::new(false),
                callbacks: Mutex::new(Vec::new()),
            })
        }

        pub fn sign_out(&self) {
            *self.account.lock().unwrap() = None;
            self.fire(SessionEvent::LogoutSuccess);
        }

        pub fn fire(&self, event: SessionEvent) {
            let callbacks: Vec<_> = self.callbacks.lock().unwrap().clone();
            for callback in callbacks {
                callback(&event);
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        fn active_account(&self) -> Option<AccountInfo> {
            self.account.lock().unwrap().clone()
        }

        async fn acquire_token_silent(
            &self,
            scopes: &[String],
            _account: &AccountInfo,
        ) -> Result<AuthenticationResult, AuthError> {
            self.silent_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_silent.lock().unwrap() {
                return Err(AuthError::Network("simulated outage".to_string()));
            }
            Ok(AuthenticationResult {
                access_token: make_jwt_expiring_in(3600),
                expires_at_ms: chrono::Utc::now().timestamp_millis() + 3_600_000,
                scopes: scopes.to_vec(),
            })
        }

        async fn acquire_token_popup(
            &self,
            scopes: &[String],
        ) -> Result<AuthenticationResult, AuthError> {
            self.popup_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AuthenticationResult {
                access_token: make_jwt_expiring_in(3600),
                expires_at_ms: chrono::Utc::now().timestamp_millis() + 3_600_000,
                scopes: scopes.to_vec(),
            })
        }

        fn add_event_callback(&self, callback: SessionEventCallback) {
            self.callbacks.lock().unwrap().push(callback);
        }
    }

    pub fn graph_scopes() -> Vec<String> {
        vec!["User.Read".to_string()]
    }
}

use token_helpers::*;

// End-to-end acquisition and caching behavior
mod acquisition {
    use super::*;

    #[tokio::test]
    async fn acquire_then_cache_then_logout_clears() {
        let provider = CountingProvider::signed_in();
        let service = TokenService::new(provider.clone(), TokenRefreshConfig::default());

        let token = service
            .get_access_token(&graph_scopes(), None)
            .await
            .unwrap();
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);

        // Second call is served from cache.
        let cached = service
            .get_access_token(&graph_scopes(), None)
            .await
            .unwrap();
        assert_eq!(token, cached);
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);

        // Logout clears the cache; the next call fails fast without an
        // account rather than serving a stale token.
        provider.sign_out();
        assert!(service.get_cached_token_info(&graph_scopes()).is_none());
        assert_eq!(
            service.get_access_token(&graph_scopes(), None).await,
            Err(TokenError::NoActiveAccount)
        );
    }

    #[tokio::test]
    async fn scope_order_never_splits_the_cache() {
        let provider = CountingProvider::signed_in();
        let service = TokenService::new(provider.clone(), TokenRefreshConfig::default());

        let forward = vec!["Mail.Read".to_string(), "User.Read".to_string()];
        let backward = vec!["User.Read".to_string(), "Mail.Read".to_string()];

        service.get_access_token(&forward, None).await.unwrap();
        service.get_access_token(&backward, None).await.unwrap();
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_scopes_never_reach_the_provider() {
        let provider = CountingProvider::signed_in();
        let service = TokenService::new(provider.clone(), TokenRefreshConfig::default());

        let blank = vec!["  ".to_string(), String::new()];
        assert_eq!(
            service.get_access_token(&blank, None).await,
            Err(TokenError::InvalidScopes)
        );
        assert_eq!(
            service.refresh_token(&blank).await,
            Err(TokenError::InvalidScopes)
        );
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.popup_calls.load(Ordering::SeqCst), 0);
    }
}

// Manual refresh and its event contract
mod manual_refresh {
    use super::*;

    #[tokio::test]
    async fn refresh_replaces_the_cached_token_and_notifies() {
        let provider = CountingProvider::signed_in();
        let service = TokenService::new(provider.clone(), TokenRefreshConfig::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        service.add_refresh_listener(Arc::new(move |event| {
            sink.lock().unwrap().push(event.kind);
        }));

        let first = service
            .get_access_token(&graph_scopes(), None)
            .await
            .unwrap();
        let refreshed = service.refresh_token(&graph_scopes()).await.unwrap();
        assert_ne!(first, refreshed);
        assert_eq!(
            service.get_cached_token_info(&graph_scopes()).unwrap().token,
            refreshed
        );

        let kinds = events.lock().unwrap().clone();
        assert!(kinds.contains(&TokenRefreshEventKind::Scheduled));
        assert_eq!(kinds.last(), Some(&TokenRefreshEventKind::Success));
    }

    #[tokio::test]
    async fn failed_refresh_emits_error_and_rejects() {
        let provider = CountingProvider::signed_in();
        *provider.fail_silent.lock().unwrap() = true;
        let service = TokenService::new(provider.clone(), TokenRefreshConfig::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        service.add_refresh_listener(Arc::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));

        let err = service.refresh_token(&graph_scopes()).await.unwrap_err();
        assert_eq!(
            err,
            TokenError::Acquisition(AuthError::Network("simulated outage".to_string()))
        );

        let last = events.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.kind, TokenRefreshEventKind::Error);
        assert_eq!(last.error, Some(err));
    }
}

// Configuration sourced from the environment-shaped lookup
mod configuration {
    use super::*;
    use services::auth::config::{
        ENV_REFRESH_BUFFER, ENV_REFRESH_ENABLED, ENV_REFRESH_INTERVAL, ENV_REFRESH_TIMEOUT,
    };

    #[tokio::test]
    async fn invalid_interval_yields_defaults_but_respects_enabled() {
        let config = TokenRefreshConfig::from_lookup(|key| match key {
            k if k == ENV_REFRESH_INTERVAL => Some("0".to_string()),
            k if k == ENV_REFRESH_BUFFER => Some("10".to_string()),
            k if k == ENV_REFRESH_TIMEOUT => Some("60".to_string()),
            k if k == ENV_REFRESH_ENABLED => Some("false".to_string()),
            _ => None,
        });

        assert_eq!(config.refresh_interval_minutes, 45);
        assert_eq!(config.refresh_buffer_minutes, 5);
        assert_eq!(config.refresh_timeout_seconds, 30);
        assert!(!config.enabled);

        // A disabled config means the service never arms timers.
        let provider = CountingProvider::signed_in();
        let service = TokenService::new(provider.clone(), config);
        service
            .get_access_token(&graph_scopes(), None)
            .await
            .unwrap();
        service.schedule_token_refresh(&graph_scopes());
        // Disabled scheduling emits no Scheduled events either.
        let events = Arc::new(Mutex::new(0u32));
        let sink = events.clone();
        service.add_refresh_listener(Arc::new(move |_| {
            *sink.lock().unwrap() += 1;
        }));
        service.schedule_token_refresh(&graph_scopes());
        assert_eq!(*events.lock().unwrap(), 0);
    }
}
