//! Inbound notification routing
//!
//! Drains the link's notification queue, decodes each payload and routes
//! it: motion to the input sink, battery and unknown messages to the log.

use super::EventSender;
use crate::domain::message::{InboundMessage, MessageTag};
use crate::domain::models::{SessionEvent, TransportEvent};
use crate::infrastructure::input_simulator::{InputSink, WheelAxis, WHEEL_DELTA};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Why the inbound path stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEnd {
    /// The transport reported the link lost or closed the queue
    Disconnected,
    /// Session cancellation was signalled
    Cancelled,
}

pub struct NotificationDispatcher<S> {
    sink: S,
    events: EventSender,
    emit_coarse: bool,
    hires_remainder: i32,
}

impl<S: InputSink> NotificationDispatcher<S> {
    pub fn new(sink: S, events: EventSender) -> Self {
        Self {
            sink,
            events,
            emit_coarse: false,
            hires_remainder: 0,
        }
    }

    /// Also emit one coarse wheel event per full detent of accumulated
    /// high-resolution motion
    pub fn with_coarse_wheel(mut self, enabled: bool) -> Self {
        self.emit_coarse = enabled;
        self
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Decode and route one raw payload
    pub fn handle_payload(&mut self, payload: &[u8]) -> InboundMessage {
        let message = InboundMessage::decode(payload);
        debug!("Received data: {}", message.raw_text);
        self.dispatch(&message);
        message
    }

    pub fn dispatch(&mut self, message: &InboundMessage) {
        match (message.tag, message.parsed_value) {
            (MessageTag::Motion, Some(delta)) => self.emit_motion(delta),
            (MessageTag::Battery, Some(level)) => {
                if (0..=100).contains(&level) {
                    info!("Battery level: {}%", level);
                } else {
                    warn!("Battery level out of range: {}", level);
                }
                self.events.send(SessionEvent::Battery(level));
            }
            _ => info!("Received unknown data: {}", message.raw_text),
        }
    }

    fn emit_motion(&mut self, delta: i32) {
        if let Err(e) = self.sink.emit_relative(WheelAxis::HiRes, delta) {
            warn!("Failed to emit wheel motion {}: {:#}", delta, e);
        }

        if !self.emit_coarse {
            return;
        }
        self.hires_remainder = self.hires_remainder.saturating_add(delta);
        let detents = self.hires_remainder / WHEEL_DELTA;
        if detents != 0 {
            self.hires_remainder -= detents * WHEEL_DELTA;
            if let Err(e) = self.sink.emit_relative(WheelAxis::Coarse, detents) {
                warn!("Failed to emit coarse wheel motion {}: {:#}", detents, e);
            }
        }
    }

    /// Drain the queue until the link goes away or the session is cancelled
    pub async fn run(
        &mut self,
        mut notifications: mpsc::Receiver<TransportEvent>,
        mut cancel: watch::Receiver<bool>,
    ) -> InboundEnd {
        if *cancel.borrow() {
            return InboundEnd::Cancelled;
        }
        loop {
            tokio::select! {
                event = notifications.recv() => match event {
                    Some(TransportEvent::Notification(payload)) => {
                        self.handle_payload(&payload);
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        info!("Notification stream ended");
                        return InboundEnd::Disconnected;
                    }
                },
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return InboundEnd::Cancelled;
                    }
                }
            }
        }
    }
}
