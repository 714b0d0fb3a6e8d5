//! Session lifecycle
//!
//! ```text
//! Idle -> Connecting -> Validating -> Subscribing -> Active -> Closing -> Closed
//!    \________\______________\______________\____________________-> Failed
//! ```
//!
//! Validation problems are warnings: the session continues degraded. Once
//! connected, every path out releases the link.

use super::command::{connect_hint, CommandChannel, OutboundEnd};
use super::dispatcher::{InboundEnd, NotificationDispatcher};
use super::EventSender;
use crate::domain::error::SessionError;
use crate::domain::models::{
    MessageSeverity, PeripheralRecord, ServiceDescriptor, SessionState, TransportEvent,
};
use crate::domain::settings::Settings;
use crate::infrastructure::input_simulator::InputSink;
use crate::infrastructure::operator_input::LineSource;
use crate::infrastructure::transport::{BleCentral, BleLink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub service_uuid: Uuid,
    pub rx_char_uuid: Uuid,
    pub tx_char_uuid: Uuid,
    pub connection_timeout: Duration,
    pub write_timeout: Duration,
    pub queue_capacity: usize,
    pub emit_coarse_wheel: bool,
}

impl From<&Settings> for SessionConfig {
    fn from(s: &Settings) -> Self {
        Self {
            service_uuid: s.ble_service_uuid,
            rx_char_uuid: s.ble_rx_char_uuid,
            tx_char_uuid: s.ble_tx_char_uuid,
            connection_timeout: s.connection_timeout(),
            write_timeout: s.write_timeout(),
            queue_capacity: s.notification_queue_capacity.max(1),
            emit_coarse_wheel: s.emit_coarse_wheel,
        }
    }
}

/// Outcome of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// `Closed` or `Failed`
    pub final_state: SessionState,
    /// Non-fatal validation findings
    pub warnings: Vec<SessionError>,
    /// The condition that ended the session, `None` for an operator exit
    pub error: Option<SessionError>,
}

impl SessionReport {
    pub fn failed(&self) -> bool {
        self.final_state == SessionState::Failed
    }
}

/// Owns the link and the input sink for the lifetime of one session
pub struct SessionController<S> {
    config: SessionConfig,
    events: EventSender,
    state: SessionState,
    warnings: Vec<SessionError>,
    sink: Option<S>,
    link: Option<Arc<dyn BleLink>>,
}

impl<S: InputSink + 'static> SessionController<S> {
    pub fn new(config: SessionConfig, sink: S, events: EventSender) -> Self {
        Self {
            config,
            events,
            state: SessionState::Idle,
            warnings: Vec::new(),
            sink: Some(sink),
            link: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            error!("Illegal session transition {} -> {}", self.state, next);
            return;
        }
        debug!("Session state {} -> {}", self.state, next);
        self.state = next;
        self.events.state(next);
    }

    fn record_warning(&mut self, warning: SessionError) {
        warn!("{}", warning);
        self.events
            .log(format!("WARNING: {}", warning), MessageSeverity::Warning);
        self.warnings.push(warning);
    }

    fn report(&self, error: Option<SessionError>) -> SessionReport {
        SessionReport {
            final_state: self.state,
            warnings: self.warnings.clone(),
            error,
        }
    }

    /// Run the whole lifecycle against `peripheral`.
    ///
    /// `shutdown` ends the Active state like an operator exit. Errors never
    /// escape: they are reported in the returned [`SessionReport`].
    pub async fn run(
        &mut self,
        central: &dyn BleCentral,
        peripheral: &PeripheralRecord,
        input: Box<dyn LineSource>,
        shutdown: watch::Receiver<bool>,
    ) -> SessionReport {
        if let Err(e) = self.connect(central, peripheral).await {
            return self.fail(e).await;
        }

        let services = self.enumerate_services().await;
        self.validate(&services);
        self.advance(SessionState::Subscribing);

        let notifications = match self.subscribe().await {
            Ok(rx) => rx,
            Err(e) => return self.fail(e).await,
        };
        self.advance(SessionState::Active);
        self.events.log(
            "Connected. Type a message to send, or 'exit' to quit.",
            MessageSeverity::Success,
        );

        let end = self.run_active(notifications, input, shutdown).await;

        self.advance(SessionState::Closing);
        self.teardown().await;
        self.advance(SessionState::Closed);

        if let Some(e) = &end {
            self.events.log(e.to_string(), MessageSeverity::Error);
            self.log_hint(e);
        }
        self.report(end)
    }

    async fn connect(
        &mut self,
        central: &dyn BleCentral,
        peripheral: &PeripheralRecord,
    ) -> Result<(), SessionError> {
        self.advance(SessionState::Connecting);
        self.events.log(
            format!("Connecting to {}...", peripheral),
            MessageSeverity::Info,
        );

        let timeout = self.config.connection_timeout;
        let link = match tokio::time::timeout(timeout, central.connect(peripheral, timeout)).await
        {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(SessionError::ConnectTimeout(timeout)),
        };

        info!("Connected to {}", peripheral);
        self.events.log("Connected!", MessageSeverity::Success);
        self.link = Some(link);
        self.advance(SessionState::Validating);
        Ok(())
    }

    async fn enumerate_services(&mut self) -> Vec<ServiceDescriptor> {
        let Some(link) = self.link.clone() else {
            return Vec::new();
        };
        match link.services().await {
            Ok(services) => services,
            Err(e) => {
                self.record_warning(SessionError::Transport(e));
                Vec::new()
            }
        }
    }

    /// Print what the peripheral exposes and check for the UART service
    /// and its notification characteristic
    fn validate(&mut self, services: &[ServiceDescriptor]) {
        info!("Available services:");
        for service in services {
            info!("Service: {}", service.service_id);
            for c in &service.characteristics {
                info!("  Characteristic: {}", c.characteristic_id);
                info!("  Properties: {}", c.properties);
            }
        }

        if !services
            .iter()
            .any(|s| s.service_id == self.config.service_uuid)
        {
            self.record_warning(SessionError::ServiceNotFound(self.config.service_uuid));
        }
        if !services
            .iter()
            .any(|s| s.has_characteristic(self.config.tx_char_uuid))
        {
            self.record_warning(SessionError::CharacteristicNotFound(
                self.config.tx_char_uuid,
            ));
        }
    }

    async fn subscribe(&mut self) -> Result<mpsc::Receiver<TransportEvent>, SessionError> {
        let link = self.link.clone().ok_or(SessionError::Disconnected)?;
        self.events
            .log("Activating notifications...", MessageSeverity::Info);
        let rx = link
            .subscribe(self.config.tx_char_uuid, self.config.queue_capacity)
            .await
            .map_err(|e| SessionError::SubscriptionFailed(e.to_string()))?;
        self.events
            .log("Notifications active", MessageSeverity::Success);
        Ok(rx)
    }

    /// Run inbound and outbound paths as two tasks until either ends or
    /// `shutdown` fires, then cancel the other and join both.
    async fn run_active(
        &mut self,
        notifications: mpsc::Receiver<TransportEvent>,
        mut input: Box<dyn LineSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Option<SessionError> {
        let (Some(link), Some(sink)) = (self.link.clone(), self.sink.take()) else {
            return Some(SessionError::Disconnected);
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut dispatcher = NotificationDispatcher::new(sink, self.events.clone())
            .with_coarse_wheel(self.config.emit_coarse_wheel);
        let inbound_cancel = cancel_rx.clone();
        let mut inbound = tokio::spawn(async move {
            let end = dispatcher.run(notifications, inbound_cancel).await;
            (end, dispatcher.into_sink())
        });

        let commands = CommandChannel::new(
            link,
            self.config.rx_char_uuid,
            self.config.write_timeout,
            self.events.clone(),
        );
        let mut outbound =
            tokio::spawn(async move { commands.run(input.as_mut(), cancel_rx).await });

        let mut inbound_done = None;
        let mut outbound_done = None;
        let trigger = tokio::select! {
            joined = &mut inbound => {
                inbound_done = Some(joined);
                Trigger::Inbound
            }
            joined = &mut outbound => {
                outbound_done = Some(joined);
                Trigger::Outbound
            }
            _ = wait_for_shutdown(&mut shutdown) => Trigger::Shutdown,
        };
        debug!("Active state ended by {:?}", trigger);
        let _ = cancel_tx.send(true);

        let inbound_done = match inbound_done {
            Some(joined) => joined,
            None => inbound.await,
        };
        let outbound_done = match outbound_done {
            Some(joined) => joined,
            None => outbound.await,
        };

        let inbound_end = match inbound_done {
            Ok((end, sink)) => {
                self.sink = Some(sink);
                end
            }
            Err(e) => {
                error!("Notification task failed: {}", e);
                InboundEnd::Disconnected
            }
        };
        let outbound_end = match outbound_done {
            Ok(end) => end,
            Err(e) => {
                error!("Command task failed: {}", e);
                OutboundEnd::Cancelled
            }
        };

        match (trigger, inbound_end, outbound_end) {
            (Trigger::Inbound, InboundEnd::Disconnected, _)
            | (Trigger::Outbound, _, OutboundEnd::Disconnected) => Some(SessionError::Disconnected),
            _ => None,
        }
    }

    /// Best-effort unsubscribe and release of the link
    async fn teardown(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        if let Err(e) = link.unsubscribe(self.config.tx_char_uuid).await {
            warn!("Failed to stop notifications: {}", e);
        }
        if let Err(e) = link.disconnect().await {
            warn!("Failed to disconnect: {}", e);
        }
        info!("Link released");
    }

    fn log_hint(&self, error: &SessionError) {
        if let Some(hint) = connect_hint(error) {
            self.events.log(hint, MessageSeverity::Warning);
        }
    }

    async fn fail(&mut self, error: SessionError) -> SessionReport {
        error!("Session failed: {}", error);
        self.events.log(error.to_string(), MessageSeverity::Error);
        self.log_hint(&error);
        self.advance(SessionState::Failed);
        if let Some(link) = self.link.take() {
            if let Err(e) = link.disconnect().await {
                warn!("Failed to disconnect: {}", e);
            }
        }
        self.report(Some(error))
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Inbound,
    Outbound,
    Shutdown,
}

/// Resolves once `shutdown` is set; never resolves if its sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
