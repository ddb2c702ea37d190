#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in fman
//!
//! Library crates never print. They emit [`AppEvent`]s wrapped in an
//! [`EventMessage`] on an unbounded channel, and the front end decides how to
//! render or log them. Progress and cancellation for long transactions go
//! through [`ProgressMonitor`].

pub mod meta;
pub use meta::{EventLevel, EventMessage, EventMeta, EventSource};

pub mod monitor;
pub use monitor::ProgressMonitor;

pub mod events;
pub use events::{
    AppEvent, FailureContext, GeneralEvent, InstallEvent, ProgressEvent, SiteEvent, StateEvent,
};

pub use tokio_util::sync::CancellationToken;

use tokio::sync::mpsc::UnboundedSender;

/// Sending half of the event channel
pub type EventSender = UnboundedSender<EventMessage>;

/// Receiving half of the event channel
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EventMessage>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout fman
///
/// Implemented for the raw [`EventSender`] and for any context struct that
/// holds one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(EventMessage::from_event(event));
        }
    }

    /// Emit a warning, optionally with the subject it concerns
    fn emit_warning(&self, message: impl Into<String>, context: Option<String>) {
        self.emit(AppEvent::General(GeneralEvent::Warning {
            message: message.into(),
            context,
        }));
    }

    /// Emit an operation started event
    fn emit_operation_started(&self, operation: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationStarted {
            operation: operation.into(),
        }));
    }

    /// Emit an operation completed event
    fn emit_operation_completed(&self, operation: impl Into<String>, success: bool) {
        self.emit(AppEvent::General(GeneralEvent::OperationCompleted {
            operation: operation.into(),
            success,
        }));
    }

    /// Emit an operation failed event
    fn emit_operation_failed(&self, operation: impl Into<String>, failure: FailureContext) {
        self.emit(AppEvent::General(GeneralEvent::OperationFailed {
            operation: operation.into(),
            failure,
        }));
    }

    fn emit_install(&self, event: InstallEvent) {
        self.emit(AppEvent::Install(event));
    }

    fn emit_site(&self, event: SiteEvent) {
        self.emit(AppEvent::Site(event));
    }

    fn emit_state(&self, event: StateEvent) {
        self.emit(AppEvent::State(event));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}
