//! Transport capability
//!
//! The session core talks to the BLE stack only through these two traits.
//! [`BleCentral`] finds and connects peripherals; a connected [`BleLink`]
//! enumerates services, feeds notifications into a bounded queue and
//! accepts writes.

use crate::domain::error::TransportError;
use crate::domain::models::{
    Advertisement, PeripheralRecord, ScanFilter, ServiceDescriptor, TransportEvent,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type TransportResult<T> = Result<T, TransportError>;

/// Scanning and connection establishment
#[async_trait]
pub trait BleCentral: Send + Sync {
    /// Scan until the first advertisement matching `filter` or until
    /// `timeout` elapses (`Ok(None)`).
    async fn scan(
        &self,
        filter: &ScanFilter,
        timeout: Duration,
    ) -> TransportResult<Option<PeripheralRecord>>;

    /// Unfiltered scan collecting every peer seen within `timeout`
    async fn discover(&self, timeout: Duration) -> TransportResult<Vec<Advertisement>>;

    /// Establish a connection, bounded by `timeout`
    async fn connect(
        &self,
        peripheral: &PeripheralRecord,
        timeout: Duration,
    ) -> TransportResult<Arc<dyn BleLink>>;
}

/// An established connection to one peripheral
#[async_trait]
pub trait BleLink: Send + Sync {
    async fn services(&self) -> TransportResult<Vec<ServiceDescriptor>>;

    /// Enable notifications on `characteristic`. Payloads are pushed onto a
    /// queue of `capacity` entries; a lost connection is reported as
    /// [`TransportEvent::Disconnected`] or by closing the queue.
    async fn subscribe(
        &self,
        characteristic: Uuid,
        capacity: usize,
    ) -> TransportResult<mpsc::Receiver<TransportEvent>>;

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> TransportResult<()>;

    async fn unsubscribe(&self, characteristic: Uuid) -> TransportResult<()>;

    async fn disconnect(&self) -> TransportResult<()>;
}

/// Push a notification without blocking the stack's callback thread.
///
/// Returns `false` once the consumer is gone.
pub fn forward_notification(sender: &mpsc::Sender<TransportEvent>, data: Vec<u8>) -> bool {
    match sender.try_send(TransportEvent::Notification(data)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("Notification queue full, dropping payload");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Sending side of one subscription, shared by the stack's value and
/// connection-status callbacks.
///
/// Once closed no payload is accepted and every sender is gone, so the
/// consumer sees the loss as `Disconnected` or, with a full queue, as the
/// end of the queue.
#[derive(Clone)]
pub struct NotificationFeed {
    sender: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
}

impl NotificationFeed {
    pub fn new(sender: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    pub fn push(&self, data: Vec<u8>) -> bool {
        match self.sender.lock().ok().as_deref() {
            Some(Some(sender)) => forward_notification(sender, data),
            _ => false,
        }
    }

    pub fn close_with_disconnect(&self) {
        let sender = self.sender.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            let _ = sender.try_send(TransportEvent::Disconnected);
        }
    }
}
