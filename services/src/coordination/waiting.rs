//! Spinner overlay state for long-running operations.

use crate::events::EventEmitter;
use crate::registry::Service;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "WaitingService";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinnerSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// Display options for one waiting record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitingOptions {
    pub message: String,
    /// Whether the spinner blocks the whole view.
    pub overlay: bool,
    pub size: SpinnerSize,
}

impl WaitingOptions {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            overlay: true,
            size: SpinnerSize::default(),
        }
    }
}

/// One active waiting record, as broadcast to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitingState {
    pub id: String,
    pub message: String,
    pub overlay: bool,
    pub size: SpinnerSize,
    pub visible: bool,
}

#[derive(Clone, Debug)]
pub enum WaitingEvent {
    Show(WaitingState),
    Hide { id: String },
    Clear,
}

/// Tracks which operations are currently "waiting" and notifies
/// subscribers as records appear and disappear.
///
/// `show` returns an opaque id the caller must pass back to `hide`;
/// [`with_future`](Self::with_future) does that bookkeeping automatically
/// and guarantees the hide happens exactly once whether the wrapped future
/// succeeds or fails.
pub struct WaitingService {
    records: Mutex<HashMap<String, WaitingState>>,
    emitter: EventEmitter<WaitingEvent>,
}

impl WaitingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(HashMap::new()),
            emitter: EventEmitter::new(),
        })
    }

    pub fn events(&self) -> &EventEmitter<WaitingEvent> {
        &self.emitter
    }

    /// Create a waiting record and announce it. Non-blocking.
    pub fn show(&self, options: WaitingOptions) -> String {
        let state = WaitingState {
            id: format!("waiting-{}", Uuid::new_v4()),
            message: options.message,
            overlay: options.overlay,
            size: options.size,
            visible: true,
        };
        let id = state.id.clone();
        self.records
            .lock()
            .expect("waiting records poisoned")
            .insert(id.clone(), state.clone());
        self.emitter.emit(&WaitingEvent::Show(state));
        id
    }

    /// Remove a waiting record. Unknown ids are a silent no-op.
    pub fn hide(&self, id: &str) {
        let removed = self
            .records
            .lock()
            .expect("waiting records poisoned")
            .remove(id)
            .is_some();
        if removed {
            self.emitter.emit(&WaitingEvent::Hide { id: id.to_string() });
        } else {
            log::debug!("hide called for unknown waiting id: {id}");
        }
    }

    /// Drop every waiting record at once.
    pub fn clear(&self) {
        self.records.lock().expect("waiting records poisoned").clear();
        self.emitter.emit(&WaitingEvent::Clear);
    }

    /// Run a future under a waiting record, hiding it exactly once on both
    /// the success and failure path, and pass the outcome through
    /// unchanged.
    pub async fn with_future<F, T>(&self, options: WaitingOptions, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let id = self.show(options);
        let outcome = future.await;
        self.hide(&id);
        outcome
    }

    pub fn state(&self, id: &str) -> Option<WaitingState> {
        self.records
            .lock()
            .expect("waiting records poisoned")
            .get(id)
            .cloned()
    }

    pub fn is_any_active(&self) -> bool {
        !self.records.lock().expect("waiting records poisoned").is_empty()
    }

    pub fn all_states(&self) -> Vec<WaitingState> {
        self.records
            .lock()
            .expect("waiting records poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Service for WaitingService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        self.clear();
        Ok(())
    }

    fn detach_listeners(&self) {
        self.emitter.remove_all_listeners();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
