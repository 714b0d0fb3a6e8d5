//! Session error taxonomy
//!
//! Every transport failure is classified into one of these variants at the
//! boundary where it happens. [`SessionError::is_fatal`] decides whether the
//! session keeps running or tears down.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a transport adapter.
///
/// Adapters keep the stack's human-readable message intact; the command
/// channel classifies write failures by inspecting it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("BLE adapter not available: {0}")]
    AdapterUnavailable(String),

    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Device is not connected")]
    NotConnected,
}

impl TransportError {
    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            message: message.into(),
        }
    }
}

/// Errors surfaced to the operator during a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No scroll wheel found after all discovery attempts")]
    DiscoveryFailed,

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("UART service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("Notification characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Connection lost")]
    Disconnected,
}

impl SessionError {
    /// Whether this condition ends the session.
    ///
    /// Discovery failure ends the run cleanly and the validation warnings
    /// leave the session running in a degraded mode.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DiscoveryFailed
            | Self::ServiceNotFound(_)
            | Self::CharacteristicNotFound(_)
            | Self::WriteFailed(_) => false,
            Self::ConnectTimeout(_)
            | Self::Transport(_)
            | Self::SubscriptionFailed(_)
            | Self::Disconnected => true,
        }
    }
}
