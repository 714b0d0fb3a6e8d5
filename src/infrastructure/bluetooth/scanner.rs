//! BLE advertisement scanning through `BluetoothLEAdvertisementWatcher`

use super::protocol::{format_address, from_guid, winrt_error};
use crate::domain::error::TransportError;
use crate::domain::models::{Advertisement, PeripheralRecord};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

/// A running watcher; stops itself on drop
pub struct AdvertisementScan {
    watcher: BluetoothLEAdvertisementWatcher,
    token: i64,
    receiver: mpsc::UnboundedReceiver<Advertisement>,
}

impl AdvertisementScan {
    pub fn start() -> Result<Self, TransportError> {
        let watcher = BluetoothLEAdvertisementWatcher::new().map_err(|e| winrt_error("scan", e))?;
        watcher
            .SetScanningMode(BluetoothLEScanningMode::Active)
            .map_err(|e| winrt_error("scan", e))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let adv = args.Advertisement()?;
                    let service_uuids = adv.ServiceUuids()?;
                    let mut service_ids = Vec::new();
                    for i in 0..service_uuids.Size()? {
                        service_ids.push(from_guid(service_uuids.GetAt(i)?));
                    }

                    let name = adv.LocalName()?.to_string();
                    let address = format_address(args.BluetoothAddress()?);
                    let _ = sender.send(Advertisement {
                        record: PeripheralRecord::new(address, Some(name)),
                        service_ids,
                    });
                }
                Ok(())
            },
        );

        let token = watcher
            .Received(&handler)
            .map_err(|e| winrt_error("scan", e))?;
        watcher.Start().map_err(|e| {
            TransportError::AdapterUnavailable(e.message().to_string())
        })?;
        debug!("Advertisement watcher started");

        Ok(Self {
            watcher,
            token,
            receiver,
        })
    }

    /// Next advertisement, or `None` once `deadline` passes
    pub async fn next_until(&mut self, deadline: tokio::time::Instant) -> Option<Advertisement> {
        tokio::time::timeout_at(deadline, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for AdvertisementScan {
    fn drop(&mut self) {
        let _ = self.watcher.RemoveReceived(self.token);
        if self.watcher.Stop().is_ok() {
            info!("Stopped BLE scan");
        }
    }
}

/// Collect advertisements for `timeout`, one entry per address, most
/// recent name and service list winning.
pub async fn collect(timeout: Duration) -> Result<Vec<Advertisement>, TransportError> {
    let mut scan = AdvertisementScan::start()?;
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen: Vec<Advertisement> = Vec::new();

    while let Some(adv) = scan.next_until(deadline).await {
        match seen
            .iter_mut()
            .find(|known| known.record.identifier == adv.record.identifier)
        {
            Some(known) => {
                if adv.record.display_name.is_some() {
                    known.record.display_name = adv.record.display_name;
                }
                if !adv.service_ids.is_empty() {
                    known.service_ids = adv.service_ids;
                }
            }
            None => seen.push(adv),
        }
    }

    Ok(seen)
}
