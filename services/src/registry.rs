//! Application-wide service catalog with coordinated startup and shutdown.
//!
//! The registry is an explicit context object: it is constructed once at
//! application start and passed around by `Arc`, rather than living in a
//! process-global. It owns every long-lived service singleton, drives their
//! initialization concurrently, and signals readiness exactly once when all
//! of them have settled.

use crate::events::EventEmitter;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tokio::sync::watch;

/// Errors surfaced by registry operations.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service {name} not found in registry")]
    NotFound { name: String },

    #[error("service {name} failed to initialize: {reason}")]
    Initialization { name: String, reason: String },

    #[error("service {name} failed to dispose: {reason}")]
    Disposal { name: String, reason: String },

    #[error("service {name} is registered under a different concrete type")]
    TypeMismatch { name: String },
}

/// Contract for anything the registry manages.
///
/// `initialize` and `dispose` default to no-ops so cheap services only need
/// a name. Both are awaited by the registry, never fire-and-forgotten.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Stable name the service is registered under.
    fn name(&self) -> &str;

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Detach every listener subscribed to this service's own emitters.
    /// Called during unregistration so stale subscribers cannot leak.
    fn detach_listeners(&self) {}

    /// Downcast support for typed lookups via [`ServiceRegistry::require_service_as`].
    /// Implementations are always the one-liner `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Lifecycle notifications broadcast by the registry.
#[derive(Clone, Debug)]
pub enum RegistryEvent {
    Registered { name: String },
    Initialized { name: String },
    Disposed { name: String },
    Unregistered { name: String },
    Ready,
}

/// Snapshot of registry bookkeeping, mostly useful for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_services: usize,
    pub initialized_services: usize,
    pub pending_initialization: usize,
    pub is_ready: bool,
    pub service_names: Vec<String>,
}

type SharedInit = Shared<BoxFuture<'static, Result<(), Arc<ServiceError>>>>;

#[derive(Default)]
struct RegistryState {
    services: HashMap<String, Arc<dyn Service>>,
    in_flight: HashMap<String, SharedInit>,
    is_ready: bool,
}

/// Catalog of named service singletons with coordinated lifecycle.
pub struct ServiceRegistry {
    state: Mutex<RegistryState>,
    emitter: EventEmitter<RegistryEvent>,
    ready_tx: watch::Sender<bool>,
    weak_self: Weak<ServiceRegistry>,
}

impl ServiceRegistry {
    pub fn new() -> Arc<Self> {
        let (ready_tx, _ready_rx) = watch::channel(false);
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(RegistryState::default()),
            emitter: EventEmitter::new(),
            ready_tx,
            weak_self: weak_self.clone(),
        })
    }

    /// Registry lifecycle event stream.
    pub fn events(&self) -> &EventEmitter<RegistryEvent> {
        &self.emitter
    }

    /// Register a service under `name`, creating it via `factory`.
    ///
    /// This is get-or-create: when the name is already taken the existing
    /// instance is returned unchanged and the factory is not invoked (a
    /// warning is logged, this is not an error). Freshly created services
    /// begin initializing in a background task immediately; the caller is
    /// not blocked on it.
    ///
    /// The factory runs under the registry lock and must not call back into
    /// the registry.
    pub fn register_service(
        self: &Arc<Self>,
        name: &str,
        factory: impl FnOnce() -> Arc<dyn Service>,
    ) -> Arc<dyn Service> {
        let service = {
            let mut state = self.state.lock().expect("registry state poisoned");
            if let Some(existing) = state.services.get(name) {
                log::warn!("Service {name} is already registered; returning existing instance");
                return Arc::clone(existing);
            }
            let service = factory();
            state.services.insert(name.to_string(), Arc::clone(&service));
            service
        };

        self.emitter.emit(&RegistryEvent::Registered {
            name: name.to_string(),
        });

        // Kick off initialization without blocking the registering caller.
        let registry = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(e) = registry.initialize_service(&name).await {
                log::error!("Background initialization of {name} failed: {e}");
            }
        });

        service
    }

    /// Initialize one service by name.
    ///
    /// Concurrent calls while initialization is in flight all await the same
    /// shared completion instead of re-invoking `initialize`.
    pub async fn initialize_service(&self, name: &str) -> Result<(), ServiceError> {
        let init = {
            let mut state = self.state.lock().expect("registry state poisoned");
            let in_flight = state.in_flight.get(name).cloned();
            if let Some(in_flight) = in_flight {
                in_flight
            } else {
                let service = state
                    .services
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ServiceError::NotFound {
                        name: name.to_string(),
                    })?;

                let registry = self.weak_self.clone();
                let task_name = name.to_string();
                let init: SharedInit = async move {
                    let result = service.initialize().await.map_err(|e| {
                        Arc::new(ServiceError::Initialization {
                            name: task_name.clone(),
                            reason: e.to_string(),
                        })
                    });

                    if let Some(registry) = registry.upgrade() {
                        registry
                            .state
                            .lock()
                            .expect("registry state poisoned")
                            .in_flight
                            .remove(&task_name);

                        if result.is_ok() {
                            registry
                                .emitter
                                .emit(&RegistryEvent::Initialized { name: task_name });
                        }
                    }

                    result
                }
                .boxed()
                .shared();

                state.in_flight.insert(name.to_string(), init.clone());
                init
            }
        };

        init.await.map_err(|e| (*e).clone())
    }

    /// Initialize every currently-registered service concurrently.
    ///
    /// Readiness flips to `true` once all initializations have settled,
    /// success or failure; individual failures are logged and do not hold
    /// the registry hostage. The `Ready` event fires on the false→true
    /// transition only.
    pub async fn initialize_all(&self) {
        let names = self.service_names();
        let results = join_all(names.iter().map(|name| self.initialize_service(name))).await;

        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                log::error!("Service {name} failed to initialize: {e}");
            }
        }

        let became_ready = {
            let mut state = self.state.lock().expect("registry state poisoned");
            if state.is_ready {
                false
            } else {
                state.is_ready = true;
                true
            }
        };

        if became_ready {
            self.ready_tx.send_replace(true);
            self.emitter.emit(&RegistryEvent::Ready);
        }
    }

    /// Dispose and remove one service. Returns `false` if the name is unknown.
    pub async fn unregister_service(&self, name: &str) -> bool {
        let service = {
            let mut state = self.state.lock().expect("registry state poisoned");
            state.in_flight.remove(name);
            match state.services.remove(name) {
                Some(service) => service,
                None => return false,
            }
        };

        if let Err(e) = service.dispose().await {
            log::error!("Service {name} failed to dispose cleanly: {e}");
        }
        self.emitter.emit(&RegistryEvent::Disposed {
            name: name.to_string(),
        });

        service.detach_listeners();
        self.emitter.emit(&RegistryEvent::Unregistered {
            name: name.to_string(),
        });

        true
    }

    /// Unregister every service concurrently and reset readiness.
    pub async fn dispose_all(&self) {
        let names = self.service_names();
        join_all(names.iter().map(|name| self.unregister_service(name))).await;

        self.state
            .lock()
            .expect("registry state poisoned")
            .is_ready = false;
        self.ready_tx.send_replace(false);
    }

    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.state
            .lock()
            .expect("registry state poisoned")
            .services
            .get(name)
            .cloned()
    }

    pub fn require_service(&self, name: &str) -> Result<Arc<dyn Service>, ServiceError> {
        self.get_service(name).ok_or_else(|| ServiceError::NotFound {
            name: name.to_string(),
        })
    }

    /// Typed lookup: resolve a service and downcast it to its concrete type.
    pub fn require_service_as<T: Service>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        let service = self.require_service(name)?;
        service
            .as_any()
            .downcast::<T>()
            .map_err(|_| ServiceError::TypeMismatch {
                name: name.to_string(),
            })
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.state
            .lock()
            .expect("registry state poisoned")
            .services
            .contains_key(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("registry state poisoned")
            .services
            .keys()
            .cloned()
            .collect()
    }

    /// Defensive copy of the full catalog.
    pub fn all_services(&self) -> HashMap<String, Arc<dyn Service>> {
        self.state
            .lock()
            .expect("registry state poisoned")
            .services
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().expect("registry state poisoned").is_ready
    }

    /// Resolve immediately when ready, otherwise wait for the next `Ready`
    /// transition.
    pub async fn wait_for_ready(&self) {
        let mut ready_rx = self.ready_tx.subscribe();
        if *ready_rx.borrow() {
            return;
        }
        while ready_rx.changed().await.is_ok() {
            if *ready_rx.borrow() {
                return;
            }
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock().expect("registry state poisoned");
        let total = state.services.len();
        let pending = state.in_flight.len();
        let mut names: Vec<String> = state.services.keys().cloned().collect();
        names.sort();
        RegistryStats {
            total_services: total,
            initialized_services: total.saturating_sub(pending),
            pending_initialization: pending,
            is_ready: state.is_ready,
            service_names: names,
        }
    }
}
