//! Access-token acquisition, caching, and transparent refresh.
//!
//! One token is cached per distinct scope set, keyed by the canonical scope
//! key. A background timer per scope key re-acquires the token silently
//! every `refresh_interval_minutes`; failed scheduled refreshes retry with
//! capped exponential backoff before the scope set is abandoned until
//! something re-schedules it.

use super::config::{TokenRefreshConfig, TokenRefreshConfigUpdate};
use super::error::TokenError;
use super::jwt;
use super::provider::{
    AccountInfo, AuthError, AuthenticationResult, IdentityProvider, SessionEvent,
};
use super::types::{
    DEFAULT_GRAPH_SCOPES, TokenInfo, TokenRefreshEvent, TokenRefreshEventKind, sanitize_scopes,
    scope_key,
};
use crate::events::{EventEmitter, Listener, ListenerId};
use crate::registry::Service;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

pub const SERVICE_NAME: &str = "TokenService";

const MAX_REFRESH_RETRIES: u32 = 3;
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Obtains, caches, and transparently refreshes access tokens for named
/// OAuth scope sets.
///
/// Callers never choose between silent and interactive acquisition:
/// [`get_access_token`](Self::get_access_token) serves from cache when the
/// token is fresh, refreshes silently when it is stale, and falls back to a
/// popup when the provider signals that interaction is required.
///
/// Locks are only ever held for plain map reads/writes, never across an
/// `await`.
pub struct TokenService {
    provider: Arc<dyn IdentityProvider>,
    config: RwLock<TokenRefreshConfig>,
    token_cache: Mutex<HashMap<String, TokenInfo>>,
    refresh_timers: Mutex<HashMap<String, JoinHandle<()>>>,
    emitter: EventEmitter<TokenRefreshEvent>,
    baseline_scopes: Vec<String>,
    weak_self: Weak<TokenService>,
}

impl TokenService {
    /// Create a token service with the default baseline scope set
    /// (Microsoft Graph `User.Read`).
    pub fn new(provider: Arc<dyn IdentityProvider>, config: TokenRefreshConfig) -> Arc<Self> {
        Self::with_baseline_scopes(provider, config, DEFAULT_GRAPH_SCOPES.clone())
    }

    /// Create a token service whose login/logout re-initialization arms the
    /// given baseline scope set.
    pub fn with_baseline_scopes(
        provider: Arc<dyn IdentityProvider>,
        config: TokenRefreshConfig,
        baseline_scopes: Vec<String>,
    ) -> Arc<Self> {
        let service = Arc::new_cyclic(|weak_self| Self {
            provider: Arc::clone(&provider),
            config: RwLock::new(config),
            token_cache: Mutex::new(HashMap::new()),
            refresh_timers: Mutex::new(HashMap::new()),
            emitter: EventEmitter::new(),
            baseline_scopes,
            weak_self: weak_self.clone(),
        });

        // Login/logout invalidates everything the service has cached or
        // scheduled; registered once here, not per reset.
        let weak = Arc::downgrade(&service);
        provider.add_event_callback(Arc::new(move |event| {
            if matches!(event, SessionEvent::LoginSuccess | SessionEvent::LogoutSuccess)
                && let Some(service) = weak.upgrade()
            {
                service.reset_refresh_schedules();
            }
        }));

        service
    }

    /// Refresh notification stream.
    pub fn refresh_events(&self) -> &EventEmitter<TokenRefreshEvent> {
        &self.emitter
    }

    /// Subscribe to refresh notifications. Listener panics are isolated
    /// per listener and cannot break delivery to other subscribers.
    pub fn add_refresh_listener(&self, listener: Listener<TokenRefreshEvent>) -> ListenerId {
        self.emitter.on(listener)
    }

    pub fn remove_refresh_listener(&self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    fn emit_refresh_event(
        &self,
        kind: TokenRefreshEventKind,
        scopes: &[String],
        error: Option<TokenError>,
    ) {
        self.emitter.emit(&TokenRefreshEvent {
            kind,
            scopes: scopes.to_vec(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            error,
        });
    }

    /// Immutable snapshot of the current refresh configuration.
    pub fn get_refresh_config(&self) -> TokenRefreshConfig {
        self.config.read().expect("refresh config poisoned").clone()
    }

    /// Merge a partial configuration update.
    ///
    /// When the merged config is enabled the whole refresh service resets
    /// (all timers cancelled, cache cleared, baseline re-armed); when
    /// disabled the service stops entirely.
    pub fn update_refresh_config(&self, update: TokenRefreshConfigUpdate) {
        let enabled = {
            let mut config = self.config.write().expect("refresh config poisoned");
            *config = config.merged(&update);
            config.enabled
        };

        if enabled {
            self.reset_refresh_schedules();
        } else {
            self.stop_refresh_service();
        }
    }

    /// Pure cache lookup by canonical scope key. Returns `None` for
    /// invalid scope input as well as for a cache miss.
    pub fn get_cached_token_info(&self, scopes: &[String]) -> Option<TokenInfo> {
        let valid = sanitize_scopes(scopes).ok()?;
        self.token_cache
            .lock()
            .expect("token cache poisoned")
            .get(&scope_key(&valid))
            .cloned()
    }

    /// Whether a token is due for proactive refresh: its expiry is within
    /// `refresh_buffer_minutes` of now. Undecodable tokens and tokens
    /// without an expiry claim are conservatively due.
    pub fn should_refresh_token(&self, token: &str) -> bool {
        let Some(exp) = jwt::expiry_epoch_secs(token) else {
            return true;
        };
        let buffer_secs = self.get_refresh_config().refresh_buffer().as_secs() as i64;
        exp <= chrono::Utc::now().timestamp() + buffer_secs
    }

    /// Get an access token for the scope set, preferring the cache, then
    /// silent acquisition, then an interactive popup when the provider
    /// reports that silent acquisition cannot proceed.
    ///
    /// A fresh cached token is returned immediately and a refresh timer is
    /// armed for the scope key if none is pending.
    pub async fn get_access_token(
        &self,
        scopes: &[String],
        account: Option<AccountInfo>,
    ) -> Result<String, TokenError> {
        let valid = sanitize_scopes(scopes)?;
        let account = account
            .or_else(|| self.provider.active_account())
            .ok_or(TokenError::NoActiveAccount)?;

        let key = scope_key(&valid);
        let cached = self
            .token_cache
            .lock()
            .expect("token cache poisoned")
            .get(&key)
            .cloned();
        if let Some(cached) = cached
            && !self.should_refresh_token(&cached.token)
        {
            if !self.is_refresh_scheduled(&key) {
                self.schedule_token_refresh(&valid);
            }
            return Ok(cached.token);
        }

        match self.provider.acquire_token_silent(&valid, &account).await {
            Ok(result) => {
                self.cache_token(&valid, &result);
                if self.get_refresh_config().enabled {
                    self.schedule_token_refresh(&valid);
                }
                Ok(result.access_token)
            }
            Err(AuthError::InteractionRequired(_)) => {
                log::info!("Silent token acquisition failed, falling back to interactive");
                self.acquire_interactive(&valid).await
            }
            Err(e) => Err(TokenError::Acquisition(e)),
        }
    }

    /// Get an access token through an interactive popup, bypassing the
    /// silent path entirely.
    pub async fn get_access_token_interactive(
        &self,
        scopes: &[String],
    ) -> Result<String, TokenError> {
        let valid = sanitize_scopes(scopes)?;
        self.acquire_interactive(&valid).await
    }

    async fn acquire_interactive(&self, valid: &[String]) -> Result<String, TokenError> {
        match self.provider.acquire_token_popup(valid).await {
            Ok(result) => {
                self.cache_token(valid, &result);
                if self.get_refresh_config().enabled {
                    self.schedule_token_refresh(valid);
                }
                Ok(result.access_token)
            }
            Err(e) => {
                log::error!("Interactive token acquisition failed: {e}");
                Err(TokenError::from_auth(e))
            }
        }
    }

    /// Manually force a silent refresh for the scope set.
    ///
    /// Emits `Scheduled` up front, performs the refresh bounded by
    /// `refresh_timeout_seconds`, re-arms the periodic timer, and emits
    /// `Success` or `Error` before returning. A manual refresh may race a
    /// scheduled one for the same scopes; the cache keeps whichever result
    /// lands last.
    pub async fn refresh_token(&self, scopes: &[String]) -> Result<String, TokenError> {
        let valid = sanitize_scopes(scopes)?;
        let account = self
            .provider
            .active_account()
            .ok_or(TokenError::NoActiveAccount)?;

        self.emit_refresh_event(TokenRefreshEventKind::Scheduled, &valid, None);

        match self.refresh_token_silently(&valid, &account).await {
            Ok(result) => {
                self.schedule_token_refresh(&valid);
                self.emit_refresh_event(TokenRefreshEventKind::Success, &valid, None);
                Ok(result.access_token)
            }
            Err(e) => {
                log::error!("Manual token refresh failed: {e}");
                self.emit_refresh_event(TokenRefreshEventKind::Error, &valid, Some(e.clone()));
                Err(e)
            }
        }
    }

    /// Silent refresh bounded by the configured timeout.
    ///
    /// On timeout the in-flight provider call is dropped and its eventual
    /// outcome discarded; the timeout only bounds how long we wait.
    async fn refresh_token_silently(
        &self,
        valid: &[String],
        account: &AccountInfo,
    ) -> Result<AuthenticationResult, TokenError> {
        let timeout_secs = self.get_refresh_config().refresh_timeout_seconds;
        let acquisition = self.provider.acquire_token_silent(valid, account);

        let result = match timeout(Duration::from_secs(timeout_secs), acquisition).await {
            Ok(outcome) => outcome.map_err(TokenError::from_auth)?,
            Err(_) => {
                return Err(TokenError::RefreshTimeout {
                    seconds: timeout_secs,
                });
            }
        };

        self.cache_token(valid, &result);
        Ok(result)
    }

    fn cache_token(&self, valid: &[String], result: &AuthenticationResult) {
        self.token_cache
            .lock()
            .expect("token cache poisoned")
            .insert(
                scope_key(valid),
                TokenInfo {
                    token: result.access_token.clone(),
                    expires_at_ms: result.expires_at_ms,
                    scopes: valid.to_vec(),
                },
            );
    }

    /// Arm (or re-arm) the periodic refresh timer for a scope set.
    ///
    /// No-op when refresh is disabled or the scopes are invalid. At most
    /// one timer is pending per scope key: scheduling cancels any prior
    /// timer before arming the new one, so repeated calls simply re-arm.
    pub fn schedule_token_refresh(&self, scopes: &[String]) {
        let config = self.get_refresh_config();
        if !config.enabled {
            return;
        }
        let Ok(valid) = sanitize_scopes(scopes) else {
            return;
        };
        let Some(service) = self.weak_self.upgrade() else {
            return;
        };

        let key = scope_key(&valid);
        let interval = config.refresh_interval();
        let task_scopes = valid.clone();
        let handle = tokio::spawn(async move {
            sleep(interval).await;
            service.perform_scheduled_refresh(&task_scopes, 0).await;
        });
        self.arm_timer(&key, handle);

        self.emit_refresh_event(TokenRefreshEventKind::Scheduled, &valid, None);
        log::info!(
            "Token refresh scheduled for scopes [{}] in {} minutes",
            valid.join(", "),
            config.refresh_interval_minutes
        );
    }

    fn arm_timer(&self, key: &str, handle: JoinHandle<()>) {
        let mut timers = self.refresh_timers.lock().expect("refresh timers poisoned");
        if let Some(existing) = timers.remove(key) {
            existing.abort();
        }
        timers.insert(key.to_string(), handle);
    }

    fn is_refresh_scheduled(&self, key: &str) -> bool {
        self.refresh_timers
            .lock()
            .expect("refresh timers poisoned")
            .get(key)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// One scheduled (or retry) refresh attempt. `failed_attempts` counts
    /// failures so far in the current retry chain.
    async fn perform_scheduled_refresh(&self, valid: &[String], failed_attempts: u32) {
        log::debug!(
            "Performing scheduled refresh for scopes: [{}]",
            valid.join(", ")
        );

        let Some(account) = self.provider.active_account() else {
            log::warn!("No active account found for scheduled refresh");
            return;
        };

        match self.refresh_token_silently(valid, &account).await {
            Ok(_) => {
                self.schedule_token_refresh(valid);
                self.emit_refresh_event(TokenRefreshEventKind::Success, valid, None);
            }
            Err(e) => {
                log::error!("Scheduled token refresh failed: {e}");
                self.emit_refresh_event(TokenRefreshEventKind::Error, valid, Some(e));
                self.schedule_retry_refresh(valid.to_vec(), failed_attempts + 1);
            }
        }
    }

    /// Arm a backoff retry: 1s, 2s, 4s, capped at one minute. After
    /// `MAX_REFRESH_RETRIES` failed retries the scope set is abandoned
    /// until something re-schedules it.
    fn schedule_retry_refresh(&self, valid: Vec<String>, retry_count: u32) {
        if retry_count > MAX_REFRESH_RETRIES {
            log::error!(
                "Token refresh failed after {MAX_REFRESH_RETRIES} retries for scopes: [{}]",
                valid.join(", ")
            );
            return;
        }
        let Some(service) = self.weak_self.upgrade() else {
            return;
        };

        let delay_ms = (1000u64 << (retry_count - 1)).min(MAX_RETRY_DELAY_MS);
        let key = scope_key(&valid);
        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(delay_ms)).await;
            service.perform_scheduled_refresh(&valid, retry_count).await;
        });
        self.arm_timer(&key, handle);

        log::info!("Retry {retry_count} scheduled in {delay_ms}ms");
    }

    /// Cancel everything and start over: all timers aborted, cache
    /// cleared, and the baseline scope set re-armed when a user is signed
    /// in and refresh is enabled.
    pub fn reset_refresh_schedules(&self) {
        log::info!("Resetting all token refresh schedules");
        self.cancel_all_timers();
        self.token_cache
            .lock()
            .expect("token cache poisoned")
            .clear();

        if self.provider.active_account().is_some() && self.get_refresh_config().enabled {
            self.initialize_refresh_service();
        }
    }

    fn initialize_refresh_service(&self) {
        log::info!(
            "Token refresh service initialized with config: {:?}",
            self.get_refresh_config()
        );
        let baseline = self.baseline_scopes.clone();
        self.schedule_token_refresh(&baseline);
    }

    fn cancel_all_timers(&self) {
        let mut timers = self.refresh_timers.lock().expect("refresh timers poisoned");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// Full teardown: cancel all timers, clear the cache, drop every
    /// refresh listener.
    pub fn stop_refresh_service(&self) {
        log::info!("Stopping token refresh service");
        self.cancel_all_timers();
        self.token_cache
            .lock()
            .expect("token cache poisoned")
            .clear();
        self.emitter.remove_all_listeners();
    }

    /// ID token of the active account, when one is signed in.
    pub fn get_id_token(&self) -> Option<String> {
        self.provider.active_account().and_then(|account| account.id_token)
    }

    // Token introspection, delegated to the `jwt` helpers so callers that
    // only hold the service do not need a second import.

    pub fn decode_jwt_token(&self, token: &str) -> Option<serde_json::Value> {
        jwt::decode_jwt_token(token)
    }

    pub fn get_token_claims(&self, token: &str) -> Option<serde_json::Value> {
        jwt::token_claims(token)
    }

    pub fn is_token_expired(&self, token: &str) -> bool {
        jwt::is_token_expired(token)
    }

    pub fn create_auth_header(&self, token: &str) -> reqwest::header::HeaderMap {
        jwt::create_auth_header(token)
    }
}

#[async_trait]
impl Service for TokenService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        if self.get_refresh_config().enabled {
            self.initialize_refresh_service();
        }
        Ok(())
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        self.stop_refresh_service();
        Ok(())
    }

    fn detach_listeners(&self) {
        self.emitter.remove_all_listeners();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
