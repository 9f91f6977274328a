//! Authenticated JSON API client.
//!
//! Thin layer over `reqwest` that pulls an access token from the
//! [`TokenService`] for every request and attaches the bearer header, so
//! callers never touch tokens directly.

use crate::auth::{TokenError, TokenService};
use crate::events::EventEmitter;
use crate::registry::Service;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub const SERVICE_NAME: &str = "ApiService";

pub const ENV_API_BASE_URL: &str = "API_BASE_URL";
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("token acquisition failed: {0}")]
    Token(#[from] TokenError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },
}

#[derive(Clone, Debug)]
pub enum ApiEvent {
    BaseUrlChanged { base_url: String },
}

/// JSON HTTP client whose requests carry a bearer token for the service's
/// configured scope set.
pub struct ApiService {
    client: reqwest::Client,
    base_url: RwLock<String>,
    token_service: Arc<TokenService>,
    scopes: Vec<String>,
    emitter: EventEmitter<ApiEvent>,
}

impl ApiService {
    pub fn new(
        token_service: Arc<TokenService>,
        base_url: impl Into<String>,
        scopes: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            base_url: RwLock::new(base_url.into()),
            token_service,
            scopes,
            emitter: EventEmitter::new(),
        })
    }

    /// Construct with the base URL from the environment, defaulting scopes
    /// to the token service's baseline Graph scope set.
    pub fn from_env(token_service: Arc<TokenService>) -> Arc<Self> {
        let base_url =
            std::env::var(ENV_API_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(
            token_service,
            base_url,
            crate::auth::DEFAULT_GRAPH_SCOPES.clone(),
        )
    }

    pub fn events(&self) -> &EventEmitter<ApiEvent> {
        &self.emitter
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().expect("base url poisoned").clone()
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        let base_url = base_url.into();
        *self.base_url.write().expect("base url poisoned") = base_url.clone();
        log::info!("API base URL changed to {base_url}");
        self.emitter.emit(&ApiEvent::BaseUrlChanged { base_url });
    }

    fn url_for(&self, path: &str) -> String {
        let base = self.base_url();
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Resolve the scope set for one request: an explicit override, or
    /// the service's configured default.
    fn scopes_for<'a>(&'a self, scopes: Option<&'a [String]>) -> &'a [String] {
        scopes.unwrap_or(&self.scopes)
    }

    async fn bearer_headers(
        &self,
        scopes: Option<&[String]>,
    ) -> Result<reqwest::header::HeaderMap, ApiError> {
        let token = self
            .token_service
            .get_access_token(self.scopes_for(scopes), None)
            .await?;
        Ok(self.token_service.create_auth_header(&token))
    }

    /// GET a JSON resource using the default scope set.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_json_with_scopes(path, None).await
    }

    /// GET a JSON resource, optionally overriding the token scope set for
    /// this request only.
    pub async fn get_json_with_scopes<T: DeserializeOwned>(
        &self,
        path: &str,
        scopes: Option<&[String]>,
    ) -> Result<T, ApiError> {
        let url = self.url_for(path);
        let headers = self.bearer_headers(scopes).await?;
        let response = self.client.get(&url).headers(headers).send().await?;
        Self::decode(url, response).await
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.post_json_with_scopes(path, body, None).await
    }

    pub async fn post_json_with_scopes<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        scopes: Option<&[String]>,
    ) -> Result<T, ApiError> {
        let url = self.url_for(path);
        let headers = self.bearer_headers(scopes).await?;
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        Self::decode(url, response).await
    }

    /// PUT a JSON body and decode the JSON response.
    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.put_json_with_scopes(path, body, None).await
    }

    pub async fn put_json_with_scopes<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        scopes: Option<&[String]>,
    ) -> Result<T, ApiError> {
        let url = self.url_for(path);
        let headers = self.bearer_headers(scopes).await?;
        let response = self
            .client
            .put(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        Self::decode(url, response).await
    }

    /// DELETE a resource and decode the JSON response.
    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.delete_json_with_scopes(path, None).await
    }

    pub async fn delete_json_with_scopes<T: DeserializeOwned>(
        &self,
        path: &str,
        scopes: Option<&[String]>,
    ) -> Result<T, ApiError> {
        let url = self.url_for(path);
        let headers = self.bearer_headers(scopes).await?;
        let response = self.client.delete(&url).headers(headers).send().await?;
        Self::decode(url, response).await
    }

    async fn decode<T: DeserializeOwned>(
        url: String,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("API request to {url} failed with status {status}");
            return Err(ApiError::UnexpectedStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Service for ApiService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn detach_listeners(&self) {
        self.emitter.remove_all_listeners();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
