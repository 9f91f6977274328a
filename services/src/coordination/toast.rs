//! Ephemeral toast notifications.
//!
//! Unlike the waiting service this one stores nothing: a toast is built,
//! broadcast to subscribers, and forgotten. Subscribers own display and
//! auto-dismissal, using the suggested duration carried on the message;
//! `hide` and `clear` are likewise pure broadcasts for early dismissal.

use crate::events::EventEmitter;
use crate::registry::Service;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use uuid::Uuid;

pub const SERVICE_NAME: &str = "ToastService";

const ERROR_DURATION_MS: u64 = 6_000;
const DEFAULT_DURATION_MS: u64 = 4_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastSeverity {
    Success,
    Error,
    Warning,
    Info,
}

impl ToastSeverity {
    /// Errors linger longer than informational toasts.
    fn suggested_duration_ms(self) -> u64 {
        match self {
            Self::Error => ERROR_DURATION_MS,
            _ => DEFAULT_DURATION_MS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToastMessage {
    pub id: String,
    pub severity: ToastSeverity,
    pub message: String,
    /// How long subscribers should keep the toast visible.
    pub duration_ms: u64,
    /// When false, the toast stays until explicitly dismissed.
    pub auto_hide: bool,
}

#[derive(Clone, Debug)]
pub enum ToastEvent {
    Show(ToastMessage),
    Hide { id: String },
    Clear,
}

pub struct ToastService {
    emitter: EventEmitter<ToastEvent>,
}

impl ToastService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            emitter: EventEmitter::new(),
        })
    }

    pub fn events(&self) -> &EventEmitter<ToastEvent> {
        &self.emitter
    }

    /// Build and broadcast a toast, returning the broadcast message.
    pub fn notify(&self, severity: ToastSeverity, message: impl Into<String>) -> ToastMessage {
        let toast = self.build(severity, message.into());
        self.emitter.emit(&ToastEvent::Show(toast.clone()));
        toast
    }

    /// Broadcast a toast that stays until the subscriber dismisses it.
    pub fn notify_sticky(&self, severity: ToastSeverity, message: impl Into<String>) -> ToastMessage {
        let toast = ToastMessage {
            auto_hide: false,
            ..self.build(severity, message.into())
        };
        self.emitter.emit(&ToastEvent::Show(toast.clone()));
        toast
    }

    fn build(&self, severity: ToastSeverity, message: String) -> ToastMessage {
        ToastMessage {
            id: format!("toast-{}", Uuid::new_v4()),
            severity,
            message,
            duration_ms: severity.suggested_duration_ms(),
            auto_hide: true,
        }
    }

    /// Ask subscribers to dismiss one toast early. Pure broadcast: the
    /// service keeps no record, so unknown ids are indistinguishable from
    /// already-dismissed ones.
    pub fn hide(&self, id: &str) {
        self.emitter.emit(&ToastEvent::Hide { id: id.to_string() });
    }

    /// Ask subscribers to dismiss every visible toast.
    pub fn clear(&self) {
        self.emitter.emit(&ToastEvent::Clear);
    }

    pub fn success(&self, message: impl Into<String>) -> ToastMessage {
        self.notify(ToastSeverity::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> ToastMessage {
        self.notify(ToastSeverity::Error, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> ToastMessage {
        self.notify(ToastSeverity::Warning, message)
    }

    pub fn info(&self, message: impl Into<String>) -> ToastMessage {
        self.notify(ToastSeverity::Info, message)
    }
}

#[async_trait]
impl Service for ToastService {
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
