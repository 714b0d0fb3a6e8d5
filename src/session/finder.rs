//! Peripheral discovery
//!
//! Strategies in priority order, retried up to `max_attempts` times:
//! advertised name, then advertised UART service. When every attempt misses,
//! all peers in range are listed and the operator picks one.

use super::EventSender;
use crate::domain::error::SessionError;
use crate::domain::models::{Advertisement, MessageSeverity, PeripheralRecord, ScanFilter};
use crate::domain::settings::Settings;
use crate::infrastructure::operator_input::LineSource;
use crate::infrastructure::transport::BleCentral;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FinderConfig {
    pub name_filter: String,
    pub service_uuid: Uuid,
    pub retry_delay: Duration,
}

impl From<&Settings> for FinderConfig {
    fn from(s: &Settings) -> Self {
        Self {
            name_filter: s.device_name_filter.clone(),
            service_uuid: s.ble_service_uuid,
            retry_delay: s.scan_retry_delay(),
        }
    }
}

pub struct PeripheralFinder<'a> {
    central: &'a dyn BleCentral,
    config: FinderConfig,
    events: EventSender,
}

impl<'a> PeripheralFinder<'a> {
    pub fn new(central: &'a dyn BleCentral, config: FinderConfig, events: EventSender) -> Self {
        Self {
            central,
            config,
            events,
        }
    }

    /// Locate the scroll wheel. `None` means nothing was found or selected;
    /// the caller decides whether that ends the run.
    pub async fn find(
        &self,
        input: &mut dyn LineSource,
        timeout: Duration,
        max_attempts: u32,
    ) -> Option<PeripheralRecord> {
        self.events
            .log("Searching for Scroll Wheel...", MessageSeverity::Info);

        for attempt in 1..=max_attempts {
            if let Some(record) = self.attempt(timeout).await {
                self.events
                    .log(format!("Device found: {}", record), MessageSeverity::Success);
                return Some(record);
            }

            self.events.log(
                format!(
                    "Attempt {}/{}: no \"{}\" found",
                    attempt, max_attempts, self.config.name_filter
                ),
                MessageSeverity::Warning,
            );
            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        let selected = self.select_manually(input, timeout).await;
        if selected.is_none() {
            let err = SessionError::DiscoveryFailed;
            info!("{}", err);
            self.events.log(err.to_string(), MessageSeverity::Warning);
        }
        selected
    }

    /// One attempt: name filter first, service filter second
    async fn attempt(&self, timeout: Duration) -> Option<PeripheralRecord> {
        let filters = [
            ScanFilter::NameContains(self.config.name_filter.clone()),
            ScanFilter::Service(self.config.service_uuid),
        ];

        for filter in &filters {
            info!("Scanning for {}", filter);
            let scan = tokio::time::timeout(timeout, self.central.scan(filter, timeout)).await;
            match scan {
                Ok(Ok(Some(record))) => return Some(record),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!("Scan error: {}", e);
                    self.events
                        .log(format!("Scan error: {}", e), MessageSeverity::Error);
                    // A failing scan fails the whole attempt
                    return None;
                }
                Err(_) => warn!("Scan for {} exceeded {:?}", filter, timeout),
            }
        }
        None
    }

    /// Unfiltered pass with operator selection
    async fn select_manually(
        &self,
        input: &mut dyn LineSource,
        timeout: Duration,
    ) -> Option<PeripheralRecord> {
        self.events.log(
            "No matching device found. Listing all BLE devices:",
            MessageSeverity::Warning,
        );

        let devices: Vec<Advertisement> =
            match tokio::time::timeout(timeout, self.central.discover(timeout)).await {
                Ok(Ok(devices)) => devices,
                Ok(Err(e)) => {
                    warn!("Discovery error: {}", e);
                    self.events
                        .log(format!("Discovery error: {}", e), MessageSeverity::Error);
                    return None;
                }
                Err(_) => {
                    warn!("Discovery exceeded {:?}", timeout);
                    Vec::new()
                }
            };

        if devices.is_empty() {
            self.events
                .log("No BLE devices in range!", MessageSeverity::Error);
            return None;
        }

        for (i, adv) in devices.iter().enumerate() {
            input.show(&format!("{}. {}", i + 1, adv.record));
        }

        let choice = input
            .next_line("\nSelect a device (number) or press Enter to quit: ")
            .await?;

        match parse_selection(&choice, devices.len()) {
            Some(index) => {
                let record = devices[index].record.clone();
                self.events
                    .log(format!("Selected: {}", record), MessageSeverity::Info);
                Some(record)
            }
            None => {
                if !choice.trim().is_empty() {
                    self.events.log("Invalid selection.", MessageSeverity::Warning);
                }
                None
            }
        }
    }
}

/// Parse a 1-based menu choice into an index
fn parse_selection(choice: &str, count: usize) -> Option<usize> {
    let number: usize = choice.trim().parse().ok()?;
    (1..=count).contains(&number).then(|| number - 1)
}
