//! In-memory transport, sink and input fakes for session tests

use crate::domain::error::TransportError;
use crate::domain::models::{
    Advertisement, CharacteristicDescriptor, CharacteristicProperties, PeripheralRecord,
    ScanFilter, ServiceDescriptor, TransportEvent,
};
use crate::domain::settings::{UART_RX_CHAR_UUID, UART_SERVICE_UUID, UART_TX_CHAR_UUID};
use crate::infrastructure::input_simulator::{InputSink, WheelAxis};
use crate::infrastructure::operator_input::LineSource;
use crate::infrastructure::transport::{BleCentral, BleLink, TransportResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn advertisement(id: &str, name: Option<&str>, services: Vec<Uuid>) -> Advertisement {
    Advertisement {
        record: PeripheralRecord::new(id, name.map(str::to_string)),
        service_ids: services,
    }
}

/// The Nordic UART service as the scroll wheel exposes it
pub fn uart_services() -> Vec<ServiceDescriptor> {
    vec![ServiceDescriptor {
        service_id: UART_SERVICE_UUID,
        characteristics: vec![
            CharacteristicDescriptor {
                characteristic_id: UART_RX_CHAR_UUID,
                properties: CharacteristicProperties::WRITE
                    .union(CharacteristicProperties::WRITE_WITHOUT_RESPONSE),
            },
            CharacteristicDescriptor {
                characteristic_id: UART_TX_CHAR_UUID,
                properties: CharacteristicProperties::NOTIFY,
            },
        ],
    }]
}

pub enum ScanOutcome {
    Found(PeripheralRecord),
    Miss,
    Error(String),
}

pub enum ConnectBehavior {
    Succeed(Arc<FakeLink>),
    Fail(TransportError),
    Hang,
}

pub struct FakeCentral {
    scans: Mutex<VecDeque<ScanOutcome>>,
    filters: Mutex<Vec<ScanFilter>>,
    discovered: Mutex<Vec<Advertisement>>,
    discover_calls: AtomicUsize,
    connect: Mutex<ConnectBehavior>,
}

impl FakeCentral {
    pub fn new() -> Self {
        Self {
            scans: Mutex::new(VecDeque::new()),
            filters: Mutex::new(Vec::new()),
            discovered: Mutex::new(Vec::new()),
            discover_calls: AtomicUsize::new(0),
            connect: Mutex::new(ConnectBehavior::Fail(TransportError::NotConnected)),
        }
    }

    /// Outcomes for successive scans; scans beyond the list miss
    pub fn push_scans(&self, outcomes: impl IntoIterator<Item = ScanOutcome>) {
        self.scans.lock().unwrap().extend(outcomes);
    }

    pub fn set_discovered(&self, devices: Vec<Advertisement>) {
        *self.discovered.lock().unwrap() = devices;
    }

    pub fn set_connect(&self, behavior: ConnectBehavior) {
        *self.connect.lock().unwrap() = behavior;
    }

    pub fn scan_filters(&self) -> Vec<ScanFilter> {
        self.filters.lock().unwrap().clone()
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleCentral for FakeCentral {
    async fn scan(
        &self,
        filter: &ScanFilter,
        _timeout: Duration,
    ) -> TransportResult<Option<PeripheralRecord>> {
        self.filters.lock().unwrap().push(filter.clone());
        let outcome = self.scans.lock().unwrap().pop_front();
        match outcome {
            Some(ScanOutcome::Found(record)) => Ok(Some(record)),
            Some(ScanOutcome::Error(message)) => Err(TransportError::operation("scan", message)),
            Some(ScanOutcome::Miss) | None => Ok(None),
        }
    }

    async fn discover(&self, _timeout: Duration) -> TransportResult<Vec<Advertisement>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.discovered.lock().unwrap().clone())
    }

    async fn connect(
        &self,
        _peripheral: &PeripheralRecord,
        _timeout: Duration,
    ) -> TransportResult<Arc<dyn BleLink>> {
        let result = match &*self.connect.lock().unwrap() {
            ConnectBehavior::Succeed(link) => Some(Ok(link.clone() as Arc<dyn BleLink>)),
            ConnectBehavior::Fail(e) => Some(Err(e.clone())),
            ConnectBehavior::Hang => None,
        };
        match result {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct FakeLink {
    services: Vec<ServiceDescriptor>,
    queued: Mutex<Vec<TransportEvent>>,
    sender: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    write_error: Mutex<Option<String>>,
    unsubscribed: Mutex<Vec<Uuid>>,
    subscribe_fails: AtomicBool,
    teardown_fails: AtomicBool,
    disconnected: AtomicBool,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services,
            ..Self::default()
        }
    }

    /// Events delivered as soon as notifications are enabled
    pub fn queue_notifications(&self, events: impl IntoIterator<Item = TransportEvent>) {
        self.queued.lock().unwrap().extend(events);
    }

    pub fn fail_writes_with(&self, message: &str) {
        *self.write_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_subscribe(&self) {
        self.subscribe_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_teardown(&self) {
        self.teardown_fails.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn unsubscribed(&self) -> Vec<Uuid> {
        self.unsubscribed.lock().unwrap().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleLink for FakeLink {
    async fn services(&self) -> TransportResult<Vec<ServiceDescriptor>> {
        Ok(self.services.clone())
    }

    async fn subscribe(
        &self,
        _characteristic: Uuid,
        capacity: usize,
    ) -> TransportResult<mpsc::Receiver<TransportEvent>> {
        if self.subscribe_fails.load(Ordering::SeqCst) {
            return Err(TransportError::operation("subscribe", "CCCD write rejected"));
        }
        let queued: Vec<TransportEvent> = self.queued.lock().unwrap().drain(..).collect();
        let (tx, rx) = mpsc::channel(capacity.max(queued.len()).max(1));
        for event in queued {
            let _ = tx.try_send(event);
        }
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> TransportResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push((characteristic, data.to_vec()));
        match &*self.write_error.lock().unwrap() {
            Some(message) => Err(TransportError::operation("write", message.clone())),
            None => Ok(()),
        }
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> TransportResult<()> {
        self.unsubscribed.lock().unwrap().push(characteristic);
        self.sender.lock().unwrap().take();
        if self.teardown_fails.load(Ordering::SeqCst) {
            return Err(TransportError::operation("unsubscribe", "not subscribed"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        if self.teardown_fails.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }
}

/// Records every emitted event; clones share the record
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(WheelAxis, i32)>>>,
    attempts: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(WheelAxis, i32)> {
        self.events.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl InputSink for RecordingSink {
    fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("sink unavailable");
        }
        self.events.lock().unwrap().push((axis, value));
        Ok(())
    }
}

/// Operator input that never produces a line
pub struct PendingLines;

#[async_trait]
impl LineSource for PendingLines {
    async fn next_line(&mut self, _prompt: &str) -> Option<String> {
        std::future::pending().await
    }

    fn show(&mut self, _text: &str) {}
}
