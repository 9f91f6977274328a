//! Single-slot modal form handshake.
//!
//! A caller opens a form and awaits the user's answer; whoever drives the
//! modal settles it with [`resolve_form`](FormService::resolve_form) or
//! [`reject_form`](FormService::reject_form). At most one form may be
//! pending at a time: opening a second while one is pending fails with
//! [`FormError::AlreadyOpen`] rather than queueing or replacing it.

use crate::events::EventEmitter;
use crate::registry::Service;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

pub const SERVICE_NAME: &str = "FormService";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("a form is already open")]
    AlreadyOpen,

    #[error("no form is currently open")]
    NotOpen,

    #[error("the form was dismissed")]
    Dismissed,
}

/// Labels for the modal's confirm/cancel buttons.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormButtonConfig {
    pub confirm_label: String,
    pub cancel_label: String,
}

impl Default for FormButtonConfig {
    fn default() -> Self {
        Self {
            confirm_label: "Save".to_string(),
            cancel_label: "Cancel".to_string(),
        }
    }
}

/// What a caller wants shown: which form definition, pre-filled with what.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormRequest {
    /// Key into the presentation layer's form definition lookup.
    pub form_id: String,
    /// Initial field values.
    pub input_model: serde_json::Value,
    pub button_config: Option<FormButtonConfig>,
    /// Identity of the entity being edited, when editing rather than creating.
    pub entity_id: Option<String>,
}

impl FormRequest {
    pub fn new(form_id: impl Into<String>, input_model: serde_json::Value) -> Self {
        Self {
            form_id: form_id.into(),
            input_model,
            button_config: None,
            entity_id: None,
        }
    }
}

/// The currently open form, as broadcast to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormState {
    pub id: String,
    pub request: FormRequest,
}

#[derive(Clone, Debug)]
pub enum FormEvent {
    Opened(FormState),
    Closed { id: String },
}

struct PendingForm {
    state: FormState,
    responder: oneshot::Sender<Result<serde_json::Value, FormError>>,
}

/// Brokers one modal form at a time between an awaiting caller and the
/// presentation layer that settles it.
pub struct FormService {
    pending: Mutex<Option<PendingForm>>,
    emitter: EventEmitter<FormEvent>,
}

impl FormService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(None),
            emitter: EventEmitter::new(),
        })
    }

    pub fn events(&self) -> &EventEmitter<FormEvent> {
        &self.emitter
    }

    /// Open a form and wait for its outcome.
    ///
    /// Resolves with the output model passed to `resolve_form`, or fails
    /// with [`FormError::Dismissed`] when the form is rejected or the
    /// service shuts down while the form is pending.
    pub async fn open_form(
        &self,
        request: FormRequest,
    ) -> Result<serde_json::Value, FormError> {
        let (responder, outcome) = oneshot::channel();
        let state = FormState {
            id: format!("form-{}", Uuid::new_v4()),
            request,
        };

        {
            let mut pending = self.pending.lock().expect("pending form poisoned");
            if pending.is_some() {
                log::warn!("open_form rejected: a form is already pending");
                return Err(FormError::AlreadyOpen);
            }
            *pending = Some(PendingForm {
                state: state.clone(),
                responder,
            });
        }
        self.emitter.emit(&FormEvent::Opened(state));

        // The sender is dropped on shutdown without settling; treat that
        // the same as an explicit dismissal.
        outcome.await.unwrap_or(Err(FormError::Dismissed))
    }

    /// Settle the open form with its output model.
    pub fn resolve_form(&self, output_model: serde_json::Value) -> Result<(), FormError> {
        self.settle(Ok(output_model))
    }

    /// Dismiss the open form; the awaiting caller sees [`FormError::Dismissed`].
    pub fn reject_form(&self) -> Result<(), FormError> {
        self.settle(Err(FormError::Dismissed))
    }

    fn settle(&self, outcome: Result<serde_json::Value, FormError>) -> Result<(), FormError> {
        let pending = self
            .pending
            .lock()
            .expect("pending form poisoned")
            .take()
            .ok_or(FormError::NotOpen)?;

        // The caller may have been dropped; closing the modal still counts.
        let _ = pending.responder.send(outcome);
        self.emitter.emit(&FormEvent::Closed {
            id: pending.state.id,
        });
        Ok(())
    }

    pub fn is_form_open(&self) -> bool {
        self.pending.lock().expect("pending form poisoned").is_some()
    }

    pub fn current_form_state(&self) -> Option<FormState> {
        self.pending
            .lock()
            .expect("pending form poisoned")
            .as_ref()
            .map(|pending| pending.state.clone())
    }
}

#[async_trait]
impl Service for FormService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        // A form pending at shutdown is dismissed, not left hanging.
        let _ = self.reject_form();
        Ok(())
    }

    fn detach_listeners(&self) {
        self.emitter.remove_all_listeners();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
