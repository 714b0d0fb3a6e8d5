//! Portable BLE transport on top of btleplug
//!
//! Peripherals are identified by their Bluetooth address where the
//! platform exposes one, otherwise by the stack's peripheral id.

use crate::domain::error::TransportError;
use crate::domain::models::{
    Advertisement, CharacteristicDescriptor, CharacteristicProperties, PeripheralRecord,
    ScanFilter as WheelScanFilter, ServiceDescriptor, TransportEvent,
};
use crate::infrastructure::transport::{
    forward_notification, BleCentral, BleLink, TransportResult,
};
use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn ble_error(operation: &'static str, e: btleplug::Error) -> TransportError {
    TransportError::operation(operation, e.to_string())
}

fn map_properties(flags: CharPropFlags) -> CharacteristicProperties {
    let table = [
        (CharPropFlags::READ, CharacteristicProperties::READ),
        (CharPropFlags::WRITE, CharacteristicProperties::WRITE),
        (
            CharPropFlags::WRITE_WITHOUT_RESPONSE,
            CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
        ),
        (CharPropFlags::NOTIFY, CharacteristicProperties::NOTIFY),
        (CharPropFlags::INDICATE, CharacteristicProperties::INDICATE),
    ];

    let mut mapped = CharacteristicProperties::empty();
    for (flag, property) in table {
        if flags.contains(flag) {
            mapped.insert(property);
        }
    }
    mapped
}

fn identifier(id: &PeripheralId, address: BDAddr) -> String {
    if address == BDAddr::default() {
        format!("{:?}", id)
    } else {
        address.to_string()
    }
}

pub struct BtleplugCentral {
    adapter: Adapter,
    known: Mutex<HashMap<String, PeripheralId>>,
}

impl BtleplugCentral {
    pub async fn new() -> TransportResult<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::AdapterUnavailable(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::AdapterUnavailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::AdapterUnavailable("no BLE adapters found".into()))?;

        match adapter.adapter_info().await {
            Ok(info) => info!("Using BLE adapter {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }

        Ok(Self {
            adapter,
            known: Mutex::new(HashMap::new()),
        })
    }

    async fn advertisement(&self, id: &PeripheralId) -> Option<Advertisement> {
        let peripheral = self.adapter.peripheral(id).await.ok()?;
        let properties = peripheral.properties().await.ok()??;
        let key = identifier(id, properties.address);
        if let Ok(mut known) = self.known.lock() {
            known.insert(key.clone(), id.clone());
        }
        Some(Advertisement {
            record: PeripheralRecord::new(key, properties.local_name),
            service_ids: properties.services,
        })
    }

    /// Run a scan, feeding each advertisement to `visit` until it returns
    /// `false` or `timeout` elapses.
    async fn scan_with<F>(&self, timeout: Duration, mut visit: F) -> TransportResult<()>
    where
        F: FnMut(Advertisement) -> bool + Send,
    {
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| ble_error("scan", e))?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| ble_error("scan", e))?;

        let deadline = tokio::time::Instant::now() + timeout;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.next()).await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };
            if let Some(adv) = self.advertisement(&id).await {
                if !visit(adv) {
                    break;
                }
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }
        Ok(())
    }

    async fn resolve(&self, peripheral: &PeripheralRecord) -> TransportResult<Peripheral> {
        let key = &peripheral.identifier.0;
        let id = self.known.lock().ok().and_then(|known| known.get(key).cloned());
        if let Some(id) = id {
            return self
                .adapter
                .peripheral(&id)
                .await
                .map_err(|e| ble_error("connect", e));
        }

        for candidate in self
            .adapter
            .peripherals()
            .await
            .map_err(|e| ble_error("connect", e))?
        {
            if let Ok(Some(props)) = candidate.properties().await {
                if identifier(&candidate.id(), props.address) == *key {
                    return Ok(candidate);
                }
            }
        }
        Err(TransportError::operation(
            "connect",
            format!("peripheral {} is not known to the adapter", key),
        ))
    }
}

#[async_trait]
impl BleCentral for BtleplugCentral {
    async fn scan(
        &self,
        filter: &WheelScanFilter,
        timeout: Duration,
    ) -> TransportResult<Option<PeripheralRecord>> {
        info!("Scanning for {} ({:?})", filter, timeout);
        let mut found = None;
        self.scan_with(timeout, |adv| {
            if filter.matches(&adv) {
                found = Some(adv.record);
                false
            } else {
                true
            }
        })
        .await?;
        Ok(found)
    }

    async fn discover(&self, timeout: Duration) -> TransportResult<Vec<Advertisement>> {
        let mut seen: Vec<Advertisement> = Vec::new();
        self.scan_with(timeout, |adv| {
            match seen
                .iter_mut()
                .find(|known| known.record.identifier == adv.record.identifier)
            {
                Some(known) => *known = adv,
                None => seen.push(adv),
            }
            true
        })
        .await?;
        Ok(seen)
    }

    async fn connect(
        &self,
        peripheral: &PeripheralRecord,
        timeout: Duration,
    ) -> TransportResult<Arc<dyn BleLink>> {
        let device = self.resolve(peripheral).await?;
        info!("Connecting to {}", peripheral);

        match tokio::time::timeout(timeout, device.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ble_error("connect", e)),
            Err(_) => {
                return Err(TransportError::operation(
                    "connect",
                    format!("timed out after {:?}", timeout),
                ))
            }
        }

        Ok(Arc::new(BtleplugLink {
            adapter: self.adapter.clone(),
            peripheral: device,
            tasks: Mutex::new(HashMap::new()),
        }))
    }
}

pub struct BtleplugLink {
    adapter: Adapter,
    peripheral: Peripheral,
    tasks: Mutex<HashMap<Uuid, Vec<JoinHandle<()>>>>,
}

impl BtleplugLink {
    fn characteristic(&self, id: Uuid) -> TransportResult<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == id)
            .ok_or(TransportError::CharacteristicNotFound(id))
    }

    fn stop_tasks(&self, characteristic: Option<Uuid>) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        let handles: Vec<JoinHandle<()>> = match characteristic {
            Some(id) => tasks.remove(&id).unwrap_or_default(),
            None => tasks.drain().flat_map(|(_, handles)| handles).collect(),
        };
        for handle in handles {
            handle.abort();
        }
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn services(&self) -> TransportResult<Vec<ServiceDescriptor>> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| ble_error("discover services", e))?;

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| ServiceDescriptor {
                service_id: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| CharacteristicDescriptor {
                        characteristic_id: c.uuid,
                        properties: map_properties(c.properties),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        capacity: usize,
    ) -> TransportResult<mpsc::Receiver<TransportEvent>> {
        let target = self.characteristic(characteristic)?;
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| ble_error("subscribe", e))?;
        let mut central_events = self
            .adapter
            .events()
            .await
            .map_err(|e| ble_error("subscribe", e))?;
        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| ble_error("subscribe", e))?;

        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let value_sender = sender.clone();
        let values = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == characteristic
                    && !forward_notification(&value_sender, notification.value)
                {
                    return;
                }
            }
            debug!("Notification stream ended");
            let _ = value_sender.send(TransportEvent::Disconnected).await;
        });

        let peripheral_id = self.peripheral.id();
        let status = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        let _ = sender.send(TransportEvent::Disconnected).await;
                        return;
                    }
                }
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(characteristic, vec![values, status]);
        }
        info!("Notifications enabled on {}", characteristic);
        Ok(receiver)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> TransportResult<()> {
        let target = self.characteristic(characteristic)?;
        let write_type = if target.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(|e| ble_error("write", e))
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> TransportResult<()> {
        self.stop_tasks(Some(characteristic));
        let target = self.characteristic(characteristic)?;
        self.peripheral
            .unsubscribe(&target)
            .await
            .map_err(|e| ble_error("unsubscribe", e))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.stop_tasks(None);
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| ble_error("disconnect", e))?;
        info!("Disconnected from device");
        Ok(())
    }
}
