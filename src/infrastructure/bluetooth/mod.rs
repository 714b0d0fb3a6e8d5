//! WinRT BLE transport
//!
//! ```text
//! WinRtCentral ──scan/discover──▶ scanner (advertisement watcher)
//!      │
//!      └──connect──▶ WinRtLink (GATT services, notifications, writes)
//! ```
//!
//! Peripheral identifiers are Bluetooth addresses formatted as
//! `AA:BB:CC:DD:EE:FF`.

pub mod connection;
pub mod protocol;
pub mod scanner;

use crate::domain::models::{Advertisement, PeripheralRecord, ScanFilter};
use crate::infrastructure::transport::{BleCentral, BleLink, TransportResult};
use async_trait::async_trait;
use connection::WinRtLink;
use scanner::AdvertisementScan;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Default)]
pub struct WinRtCentral;

impl WinRtCentral {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BleCentral for WinRtCentral {
    async fn scan(
        &self,
        filter: &ScanFilter,
        timeout: Duration,
    ) -> TransportResult<Option<PeripheralRecord>> {
        info!("Scanning for {} ({:?})", filter, timeout);
        let mut scan = AdvertisementScan::start()?;
        let deadline = tokio::time::Instant::now() + timeout;

        while let Some(adv) = scan.next_until(deadline).await {
            if filter.matches(&adv) {
                return Ok(Some(adv.record));
            }
        }
        Ok(None)
    }

    async fn discover(&self, timeout: Duration) -> TransportResult<Vec<Advertisement>> {
        scanner::collect(timeout).await
    }

    async fn connect(
        &self,
        peripheral: &PeripheralRecord,
        timeout: Duration,
    ) -> TransportResult<Arc<dyn BleLink>> {
        let address = protocol::parse_address(&peripheral.identifier.0)?;
        info!("Connecting to {}", peripheral);

        let link = tokio::time::timeout(timeout, WinRtLink::open(address))
            .await
            .map_err(|_| {
                crate::domain::error::TransportError::operation(
                    "connect",
                    format!("timed out after {:?}", timeout),
                )
            })??;
        Ok(Arc::new(link))
    }
}
