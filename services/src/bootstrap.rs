//! Application wiring: construct, register, and start every service.
//!
//! This is the single place that knows the full service roster and their
//! dependency order: the token service is built first, the API client on
//! top of it, and the coordination services alongside.

use crate::api::ApiService;
use crate::auth::{IdentityProvider, TokenRefreshConfig, TokenService};
use crate::coordination::{FormService, ToastService, WaitingService};
use crate::registry::{Service, ServiceError, ServiceRegistry};
use crate::{api, auth::token_service, coordination};
use std::sync::Arc;

/// Canonical registry names for the built-in services.
pub mod service_names {
    pub const TOKEN: &str = super::token_service::SERVICE_NAME;
    pub const WAITING: &str = super::coordination::waiting::SERVICE_NAME;
    pub const TOAST: &str = super::coordination::toast::SERVICE_NAME;
    pub const FORM: &str = super::coordination::form::SERVICE_NAME;
    pub const API: &str = super::api::SERVICE_NAME;
}

/// Typed handles to every built-in service, resolved once at startup so
/// callers do not repeat stringly-typed registry lookups.
pub struct ServiceHandles {
    pub registry: Arc<ServiceRegistry>,
    pub token: Arc<TokenService>,
    pub waiting: Arc<WaitingService>,
    pub toast: Arc<ToastService>,
    pub form: Arc<FormService>,
    pub api: Arc<ApiService>,
}

/// Register the full service roster and initialize everything.
///
/// Refresh configuration and the API base URL come from the environment.
/// Returns once the registry has signalled readiness.
pub async fn initialize_services(
    registry: &Arc<ServiceRegistry>,
    provider: Arc<dyn IdentityProvider>,
) -> Result<ServiceHandles, ServiceError> {
    let token = TokenService::new(provider, TokenRefreshConfig::from_env());
    let api = ApiService::from_env(Arc::clone(&token));
    let waiting = WaitingService::new();
    let toast = ToastService::new();
    let form = FormService::new();

    {
        let token = Arc::clone(&token);
        registry.register_service(service_names::TOKEN, move || token as Arc<dyn Service>);
    }
    {
        let waiting = Arc::clone(&waiting);
        registry.register_service(service_names::WAITING, move || waiting as Arc<dyn Service>);
    }
    {
        let toast = Arc::clone(&toast);
        registry.register_service(service_names::TOAST, move || toast as Arc<dyn Service>);
    }
    {
        let form = Arc::clone(&form);
        registry.register_service(service_names::FORM, move || form as Arc<dyn Service>);
    }
    {
        let api = Arc::clone(&api);
        registry.register_service(service_names::API, move || api as Arc<dyn Service>);
    }

    registry.initialize_all().await;
    log::info!("All services initialized");

    Ok(ServiceHandles {
        registry: Arc::clone(registry),
        token,
        waiting,
        toast,
        form,
        api,
    })
}

/// Tear down every registered service and reset readiness.
pub async fn dispose_services(registry: &ServiceRegistry) {
    registry.dispose_all().await;
    log::info!("All services disposed");
}
