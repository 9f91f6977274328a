use async_trait::async_trait;
use services::auth::{
    AccountInfo, AuthError, AuthenticationResult, IdentityProvider, SessionEventCallback,
    TokenService,
};
use services::bootstrap::{self, service_names};
use services::coordination::{
    FormError, FormRequest, FormService, ToastEvent, ToastService, ToastSeverity, WaitingOptions,
    WaitingService,
};
use services::registry::{RegistryEvent, ServiceRegistry};
use std::sync::{Arc, Mutex};

// Helper module for full-roster lifecycle testing
mod lifecycle_helpers {
    use super::*;

    /// Provider double for wiring tests; nobody is signed in, so no token
    /// traffic happens during bootstrap.
    pub struct IdleProvider;

    #[async_trait]
    impl IdentityProvider for IdleProvider {
        fn active_account(&self) -> Option<AccountInfo> {
            None
        }

        async fn acquire_token_silent(
            &self,
            _scopes: &[String],
            _account: &AccountInfo,
        ) -> Result<AuthenticationResult, AuthError> {
            Err(AuthError::InteractionRequired("signed out".to_string()))
        }

        async fn acquire_token_popup(
            &self,
            _scopes: &[String],
        ) -> Result<AuthenticationResult, AuthError> {
            Err(AuthError::Provider("no popup in tests".to_string()))
        }

        fn add_event_callback(&self, _callback: SessionEventCallback) {}
    }

    pub fn record_registry_events(registry: &ServiceRegistry) -> Arc<Mutex<Vec<String>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        registry.events().on(Arc::new(move |event: &RegistryEvent| {
            let label = match event {
                RegistryEvent::Registered { name } => format!("registered:{name}"),
                RegistryEvent::Initialized { name } => format!("initialized:{name}"),
                RegistryEvent::Disposed { name } => format!("disposed:{name}"),
                RegistryEvent::Unregistered { name } => format!("unregistered:{name}"),
                RegistryEvent::Ready => "ready".to_string(),
            };
            sink.lock().unwrap().push(label);
        }));
        events
    }
}

use lifecycle_helpers::*;

// Bootstrap wiring across the whole roster
mod full_roster {
    use super::*;

    #[tokio::test]
    async fn bootstrap_reaches_readiness_exactly_once() {
        let registry = ServiceRegistry::new();
        let events = record_registry_events(&registry);

        bootstrap::initialize_services(&registry, Arc::new(IdleProvider))
            .await
            .unwrap();
        assert!(registry.is_ready());

        // A second initialize_all after readiness is redundant but safe,
        // and must not emit a second Ready.
        registry.initialize_all().await;
        let ready_count = events
            .lock()
            .unwrap()
            .iter()
            .filter(|label| label.as_str() == "ready")
            .count();
        assert_eq!(ready_count, 1);

        let stats = registry.stats();
        assert_eq!(stats.total_services, 5);
        assert_eq!(stats.pending_initialization, 0);
    }

    #[tokio::test]
    async fn wait_for_ready_observes_bootstrap() {
        let registry = ServiceRegistry::new();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_for_ready().await })
        };

        bootstrap::initialize_services(&registry, Arc::new(IdleProvider))
            .await
            .unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn typed_lookups_resolve_every_service() {
        let registry = ServiceRegistry::new();
        bootstrap::initialize_services(&registry, Arc::new(IdleProvider))
            .await
            .unwrap();

        registry
            .require_service_as::<TokenService>(service_names::TOKEN)
            .unwrap();
        registry
            .require_service_as::<WaitingService>(service_names::WAITING)
            .unwrap();
        registry
            .require_service_as::<ToastService>(service_names::TOAST)
            .unwrap();
        registry
            .require_service_as::<FormService>(service_names::FORM)
            .unwrap();
    }

    #[tokio::test]
    async fn dispose_unwinds_the_roster_and_pending_forms() {
        let registry = ServiceRegistry::new();
        let handles = bootstrap::initialize_services(&registry, Arc::new(IdleProvider))
            .await
            .unwrap();

        // A form pending at shutdown is dismissed, not leaked.
        let opener = {
            let form = handles.form.clone();
            tokio::spawn(async move {
                form.open_form(FormRequest::new("settings", serde_json::json!({})))
                    .await
            })
        };
        tokio::task::yield_now().await;

        bootstrap::dispose_services(&registry).await;
        assert_eq!(opener.await.unwrap(), Err(FormError::Dismissed));
        assert!(!registry.is_ready());
        assert!(registry.service_names().is_empty());
    }
}

// Coordination services working together
mod coordination_flow {
    use super::*;

    #[tokio::test]
    async fn waiting_wraps_an_operation_that_raises_a_toast() {
        let registry = ServiceRegistry::new();
        let handles = bootstrap::initialize_services(&registry, Arc::new(IdleProvider))
            .await
            .unwrap();

        let toasts = Arc::new(Mutex::new(Vec::new()));
        let sink = toasts.clone();
        handles.toast.events().on(Arc::new(move |event: &ToastEvent| {
            if let ToastEvent::Show(toast) = event {
                sink.lock().unwrap().push(toast.clone());
            }
        }));

        let toast_service = handles.toast.clone();
        let outcome: Result<(), String> = handles
            .waiting
            .with_future(WaitingOptions::message("Saving"), async move {
                toast_service.error("save failed");
                Err("save failed".to_string())
            })
            .await;

        assert!(outcome.is_err());
        // The spinner is gone even though the operation failed.
        assert!(!handles.waiting.is_any_active());
        let toasts = toasts.lock().unwrap();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].severity, ToastSeverity::Error);
        assert_eq!(toasts[0].duration_ms, 6_000);
    }

    #[tokio::test]
    async fn form_handshake_under_a_waiting_record() {
        let registry = ServiceRegistry::new();
        let handles = bootstrap::initialize_services(&registry, Arc::new(IdleProvider))
            .await
            .unwrap();

        let form = handles.form.clone();
        let waiting = handles.waiting.clone();
        let opener = tokio::spawn(async move {
            waiting
                .with_future(WaitingOptions::message("Editing"), async {
                    form.open_form(FormRequest::new(
                        "user-profile",
                        serde_json::json!({ "name": "Grace" }),
                    ))
                    .await
                })
                .await
        });
        tokio::task::yield_now().await;

        assert!(handles.form.is_form_open());
        assert!(handles.waiting.is_any_active());

        handles
            .form
            .resolve_form(serde_json::json!({ "name": "Grace Hopper" }))
            .unwrap();

        let output = opener.await.unwrap().unwrap();
        assert_eq!(output["name"], "Grace Hopper");
        assert!(!handles.waiting.is_any_active());
    }
}
