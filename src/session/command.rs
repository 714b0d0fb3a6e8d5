//! Outbound operator commands
//!
//! Each operator line becomes one write to the UART RX characteristic.
//! `exit` ends the session; a write failure either ends it (link lost) or
//! is reported and the operator may retry.

use super::EventSender;
use crate::domain::error::{SessionError, TransportError};
use crate::domain::message::OutboundCommand;
use crate::domain::models::MessageSeverity;
use crate::infrastructure::operator_input::LineSource;
use crate::infrastructure::transport::BleLink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

pub const EXIT_COMMAND: &str = "exit";
const PROMPT: &str = "> ";

/// Classification of a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// The link is gone; the session must end
    Disconnected,
    /// Anything else; the operator may retry
    Transient,
}

/// Classify a write failure from the transport's human-readable message.
///
/// Only the text is available from the stacks we wrap, so this is a
/// case-insensitive substring match on "disconnected".
pub fn classify_write_error(message: &str) -> WriteFailure {
    if message.to_lowercase().contains("disconnected") {
        WriteFailure::Disconnected
    } else {
        WriteFailure::Transient
    }
}

/// Operator advice for a session that ended on a transport problem,
/// matched on the error text the stack produced.
pub fn connect_hint(error: &SessionError) -> Option<&'static str> {
    let text = error.to_string().to_lowercase();
    if text.contains("was not found") {
        Some("Make sure the scroll wheel is powered on and in range.")
    } else if matches!(error, SessionError::ConnectTimeout(_)) || text.contains("timed out") {
        Some("The scroll wheel is not responding. Restart it and try again.")
    } else if matches!(error, SessionError::Disconnected) || text.contains("disconnected") {
        Some("The scroll wheel disconnected unexpectedly.")
    } else {
        None
    }
}

/// Successful write of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub bytes_written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError {
    pub kind: WriteFailure,
    pub message: String,
}

impl From<SendError> for SessionError {
    fn from(e: SendError) -> Self {
        match e.kind {
            WriteFailure::Disconnected => SessionError::Disconnected,
            WriteFailure::Transient => SessionError::WriteFailed(e.message),
        }
    }
}

/// Why the outbound path stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundEnd {
    /// Operator typed `exit`
    OperatorExit,
    /// Operator input closed
    InputClosed,
    /// A write reported the link lost
    Disconnected,
    /// Session cancellation was signalled
    Cancelled,
}

pub struct CommandChannel {
    link: Arc<dyn BleLink>,
    rx_characteristic: Uuid,
    write_timeout: Duration,
    events: EventSender,
}

impl CommandChannel {
    pub fn new(
        link: Arc<dyn BleLink>,
        rx_characteristic: Uuid,
        write_timeout: Duration,
        events: EventSender,
    ) -> Self {
        Self {
            link,
            rx_characteristic,
            write_timeout,
            events,
        }
    }

    pub fn is_exit(text: &str) -> bool {
        text.trim().eq_ignore_ascii_case(EXIT_COMMAND)
    }

    /// Write one command; the returned future completes when the write has
    /// been acknowledged by the stack, so writes never interleave.
    pub async fn submit(&self, text: &str) -> Result<Ack, SendError> {
        let command = OutboundCommand::new(text);
        let write = self.link.write(self.rx_characteristic, command.as_bytes());

        let message = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                return Ok(Ack {
                    bytes_written: command.as_bytes().len(),
                })
            }
            Ok(Err(TransportError::Operation { message, .. })) => message,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {:?}", self.write_timeout),
        };

        Err(SendError {
            kind: classify_write_error(&message),
            message,
        })
    }

    /// Read operator lines and forward them until exit, input end, link
    /// loss or cancellation.
    pub async fn run(
        &self,
        input: &mut dyn LineSource,
        mut cancel: watch::Receiver<bool>,
    ) -> OutboundEnd {
        loop {
            if *cancel.borrow() {
                return OutboundEnd::Cancelled;
            }

            let line = tokio::select! {
                line = input.next_line(PROMPT) => line,
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return OutboundEnd::Cancelled;
                    }
                    continue;
                }
            };

            let Some(line) = line else {
                info!("Operator input closed");
                return OutboundEnd::InputClosed;
            };

            if Self::is_exit(&line) {
                self.events.log("Exiting...", MessageSeverity::Info);
                return OutboundEnd::OperatorExit;
            }

            match self.submit(&line).await {
                Ok(_) => input.show(&format!("Sent: {}", line)),
                Err(e) => {
                    warn!("Write to {} failed: {}", self.rx_characteristic, e.message);
                    let err = SessionError::from(e);
                    self.events
                        .log(format!("Send error: {}", err), MessageSeverity::Error);
                    if err.is_fatal() {
                        return OutboundEnd::Disconnected;
                    }
                }
            }
        }
    }
}
