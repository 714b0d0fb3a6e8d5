//! Session manager
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   record   ┌───────────────────────────┐
//! │ PeripheralFinder├──────────►│     SessionController     │
//! └────────────────┘            │ connect/validate/subscribe │
//!                               └─────┬───────────────┬─────┘
//!                        notifications│               │operator lines
//!                                     ▼               ▼
//!                        ┌──────────────────┐ ┌──────────────┐
//!                        │NotificationDispat│ │CommandChannel│
//!                        │  -> InputSink    │ │ -> BleLink   │
//!                        └──────────────────┘ └──────────────┘
//! ```
//!
//! - [`finder`] - name / service / manual discovery with retries
//! - [`controller`] - session state machine and teardown
//! - [`dispatcher`] - inbound message routing
//! - [`command`] - outbound commands and write-failure classification

pub mod command;
pub mod controller;
pub mod dispatcher;
pub mod finder;

#[cfg(test)]
pub(crate) mod test_support;

pub use command::{classify_write_error, CommandChannel, WriteFailure};
pub use controller::{SessionConfig, SessionController, SessionReport};
pub use dispatcher::NotificationDispatcher;
pub use finder::{FinderConfig, PeripheralFinder};

use crate::domain::models::{MessageSeverity, SessionEvent, SessionState, StatusMessage};
use tokio::sync::mpsc;

/// Publishes operator-facing events; sends are fire-and-forget
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSender {
    pub fn new(sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sender whose events go nowhere
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn send(&self, event: SessionEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn log(&self, message: impl Into<String>, severity: MessageSeverity) {
        self.send(SessionEvent::Status(StatusMessage {
            message: message.into(),
            severity,
        }));
    }

    pub fn state(&self, state: SessionState) {
        self.send(SessionEvent::StateChanged(state));
    }
}
