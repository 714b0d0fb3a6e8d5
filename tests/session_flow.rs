//! End-to-end runs of discovery and a session against an in-memory peripheral

use async_trait::async_trait;
use scroll_wheel_host::domain::error::{SessionError, TransportError};
use scroll_wheel_host::domain::models::{
    Advertisement, CharacteristicDescriptor, CharacteristicProperties, PeripheralRecord,
    ScanFilter, ServiceDescriptor, SessionEvent, SessionState, TransportEvent,
};
use scroll_wheel_host::domain::settings::{
    Settings, UART_RX_CHAR_UUID, UART_SERVICE_UUID, UART_TX_CHAR_UUID,
};
use scroll_wheel_host::infrastructure::input_simulator::{InputSink, WheelAxis};
use scroll_wheel_host::infrastructure::operator_input::{LineSource, ScriptedLines};
use scroll_wheel_host::infrastructure::transport::{BleCentral, BleLink, TransportResult};
use scroll_wheel_host::session::{
    EventSender, FinderConfig, PeripheralFinder, SessionConfig, SessionController,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use uuid::Uuid;

struct Wheel {
    notifications: Vec<&'static [u8]>,
    writes: Mutex<Vec<Vec<u8>>>,
    sender: Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl Wheel {
    fn new(notifications: Vec<&'static [u8]>) -> Arc<Self> {
        Arc::new(Self {
            notifications,
            writes: Mutex::new(Vec::new()),
            sender: Mutex::new(None),
        })
    }
}

#[async_trait]
impl BleLink for Wheel {
    async fn services(&self) -> TransportResult<Vec<ServiceDescriptor>> {
        Ok(vec![ServiceDescriptor {
            service_id: UART_SERVICE_UUID,
            characteristics: vec![
                CharacteristicDescriptor {
                    characteristic_id: UART_RX_CHAR_UUID,
                    properties: CharacteristicProperties::WRITE,
                },
                CharacteristicDescriptor {
                    characteristic_id: UART_TX_CHAR_UUID,
                    properties: CharacteristicProperties::NOTIFY,
                },
            ],
        }])
    }

    async fn subscribe(
        &self,
        _characteristic: Uuid,
        capacity: usize,
    ) -> TransportResult<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(capacity);
        for payload in &self.notifications {
            tx.try_send(TransportEvent::Notification(payload.to_vec()))
                .expect("queue capacity");
        }
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn write(&self, _characteristic: Uuid, data: &[u8]) -> TransportResult<()> {
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> TransportResult<()> {
        self.sender.lock().unwrap().take();
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        Ok(())
    }
}

struct Radio {
    by_name: Option<PeripheralRecord>,
    in_range: Vec<Advertisement>,
    wheel: Option<Arc<Wheel>>,
    scans: Mutex<Vec<ScanFilter>>,
}

#[async_trait]
impl BleCentral for Radio {
    async fn scan(
        &self,
        filter: &ScanFilter,
        _timeout: Duration,
    ) -> TransportResult<Option<PeripheralRecord>> {
        self.scans.lock().unwrap().push(filter.clone());
        Ok(match filter {
            ScanFilter::NameContains(_) => self.by_name.clone(),
            ScanFilter::Service(_) => None,
        })
    }

    async fn discover(&self, _timeout: Duration) -> TransportResult<Vec<Advertisement>> {
        Ok(self.in_range.clone())
    }

    async fn connect(
        &self,
        _peripheral: &PeripheralRecord,
        _timeout: Duration,
    ) -> TransportResult<Arc<dyn BleLink>> {
        match &self.wheel {
            Some(wheel) => Ok(wheel.clone() as Arc<dyn BleLink>),
            None => Err(TransportError::operation("connect", "peer refused")),
        }
    }
}

/// Records wheel motion and wakes the operator once motion arrives
#[derive(Clone)]
struct Screen {
    events: Arc<Mutex<Vec<(WheelAxis, i32)>>>,
    moved: Arc<Notify>,
}

impl InputSink for Screen {
    fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((axis, value));
        self.moved.notify_one();
        Ok(())
    }
}

/// Types one command, then waits for wheel motion before typing `exit`
struct Operator {
    moved: Arc<Notify>,
    lines: VecDeque<&'static str>,
}

#[async_trait]
impl LineSource for Operator {
    async fn next_line(&mut self, _prompt: &str) -> Option<String> {
        let line = self.lines.pop_front()?;
        if line == "exit" {
            self.moved.notified().await;
        }
        Some(line.to_string())
    }

    fn show(&mut self, _text: &str) {}
}

fn finder_config() -> FinderConfig {
    FinderConfig {
        retry_delay: Duration::ZERO,
        ..FinderConfig::from(&Settings::default())
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_found_by_name_then_scroll_and_exit() {
    let wheel = Wheel::new(vec![&b"BAT:87"[..], &b"SCR:3"[..], &b"SCR:-2"[..]]);
    let radio = Radio {
        by_name: Some(PeripheralRecord::new(
            "C8:2B:96:12:34:56",
            Some("Scroll Wheel".to_string()),
        )),
        in_range: Vec::new(),
        wheel: Some(wheel.clone()),
        scans: Mutex::new(Vec::new()),
    };
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let events = EventSender::new(event_tx);

    let mut unused = ScriptedLines::default();
    let finder = PeripheralFinder::new(&radio, finder_config(), events.clone());
    let peripheral = finder
        .find(&mut unused, Duration::from_millis(10), 3)
        .await
        .expect("wheel found by name");
    assert_eq!(
        *radio.scans.lock().unwrap(),
        vec![ScanFilter::NameContains("Scroll Wheel".into())]
    );

    let screen = Screen {
        events: Arc::default(),
        moved: Arc::new(Notify::new()),
    };
    let operator = Operator {
        moved: screen.moved.clone(),
        lines: VecDeque::from(["SPEED:2", "exit"]),
    };
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut controller = SessionController::new(
        SessionConfig::from(&Settings::default()),
        screen.clone(),
        events,
    );

    let report = controller
        .run(&radio, &peripheral, Box::new(operator), shutdown_rx)
        .await;

    assert_eq!(report.final_state, SessionState::Closed);
    assert_eq!(report.error, None);
    assert!(report.warnings.is_empty());
    assert_eq!(*wheel.writes.lock().unwrap(), vec![b"SPEED:2".to_vec()]);

    let motion = screen.events.lock().unwrap().clone();
    assert_eq!(motion.first(), Some(&(WheelAxis::HiRes, 3)));

    let events = drain(&mut event_rx);
    let states: Vec<SessionState> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Connecting,
            SessionState::Validating,
            SessionState::Subscribing,
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed,
        ]
    );
    assert!(events.contains(&SessionEvent::Battery(87)));
}

#[tokio::test]
async fn test_manual_pick_then_connect_failure() {
    let radio = Radio {
        by_name: None,
        in_range: vec![
            Advertisement {
                record: PeripheralRecord::new("11:11:11:11:11:11", Some("Headphones".into())),
                service_ids: Vec::new(),
            },
            Advertisement {
                record: PeripheralRecord::new("22:22:22:22:22:22", None),
                service_ids: Vec::new(),
            },
        ],
        wheel: None,
        scans: Mutex::new(Vec::new()),
    };

    let mut input = ScriptedLines::new(["2"]);
    let finder = PeripheralFinder::new(&radio, finder_config(), EventSender::disabled());
    let picked = finder
        .find(&mut input, Duration::from_millis(10), 2)
        .await
        .expect("operator picked a device");
    assert_eq!(picked.identifier.0, "22:22:22:22:22:22");
    assert_eq!(radio.scans.lock().unwrap().len(), 4);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let screen = Screen {
        events: Arc::default(),
        moved: Arc::new(Notify::new()),
    };
    let mut controller = SessionController::new(
        SessionConfig::from(&Settings::default()),
        screen.clone(),
        EventSender::disabled(),
    );
    let report = controller
        .run(
            &radio,
            &picked,
            Box::new(ScriptedLines::default()),
            shutdown_rx,
        )
        .await;

    assert!(report.failed());
    assert_eq!(
        report.error,
        Some(SessionError::Transport(TransportError::operation(
            "connect",
            "peer refused"
        )))
    );
    assert!(screen.events.lock().unwrap().is_empty());
}
