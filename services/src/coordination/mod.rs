//! Async coordination services for the presentation layer.
//!
//! Each service here owns a small piece of transient display state
//! (spinners, notifications, a modal form) and broadcasts changes through
//! its own [`EventEmitter`](crate::events::EventEmitter). None of them
//! render anything; subscribers do.

pub mod form;
pub mod toast;
pub mod waiting;

pub use form::{FormButtonConfig, FormError, FormEvent, FormRequest, FormService, FormState};
pub use toast::{ToastEvent, ToastMessage, ToastService, ToastSeverity};
pub use waiting::{SpinnerSize, WaitingEvent, WaitingOptions, WaitingService, WaitingState};
