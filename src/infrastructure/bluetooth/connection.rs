//! GATT connection to one peripheral

use super::protocol::{check_status, from_guid, map_properties, winrt_error};
use crate::domain::error::TransportError;
use crate::domain::models::{CharacteristicDescriptor, ServiceDescriptor, TransportEvent};
use crate::infrastructure::transport::{BleLink, NotificationFeed, TransportResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothCacheMode, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter};

struct Subscription {
    characteristic: GattCharacteristic,
    value_token: i64,
    status_token: i64,
}

pub struct WinRtLink {
    device: BluetoothLEDevice,
    characteristics: Mutex<HashMap<Uuid, GattCharacteristic>>,
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl WinRtLink {
    pub async fn open(address: u64) -> TransportResult<Self> {
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)
            .map_err(|e| winrt_error("connect", e))?
            .await
            .map_err(|e| winrt_error("connect", e))?;
        info!("Device opened: {:?}", device.Name().ok());

        Ok(Self {
            device,
            characteristics: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    fn characteristic(&self, id: Uuid) -> TransportResult<GattCharacteristic> {
        self.characteristics
            .lock()
            .map_err(|_| TransportError::operation("lookup", "characteristic cache poisoned"))?
            .get(&id)
            .cloned()
            .ok_or(TransportError::CharacteristicNotFound(id))
    }
}

#[async_trait]
impl BleLink for WinRtLink {
    async fn services(&self) -> TransportResult<Vec<ServiceDescriptor>> {
        let result = self
            .device
            .GetGattServicesWithCacheModeAsync(BluetoothCacheMode::Uncached)
            .map_err(|e| winrt_error("discover services", e))?
            .await
            .map_err(|e| winrt_error("discover services", e))?;
        check_status(
            "discover services",
            result.Status().map_err(|e| winrt_error("discover services", e))?,
        )?;

        let services = result
            .Services()
            .map_err(|e| winrt_error("discover services", e))?;
        let mut descriptors = Vec::new();
        let mut found = HashMap::new();

        for i in 0..services.Size().map_err(|e| winrt_error("discover services", e))? {
            let service = services
                .GetAt(i)
                .map_err(|e| winrt_error("discover services", e))?;
            let service_id = from_guid(service.Uuid().map_err(|e| winrt_error("discover services", e))?);

            let chars_result = service
                .GetCharacteristicsWithCacheModeAsync(BluetoothCacheMode::Uncached)
                .map_err(|e| winrt_error("discover characteristics", e))?
                .await
                .map_err(|e| winrt_error("discover characteristics", e))?;
            let mut characteristics = Vec::new();
            if let Err(e) = check_status(
                "discover characteristics",
                chars_result
                    .Status()
                    .map_err(|e| winrt_error("discover characteristics", e))?,
            ) {
                warn!("Service {}: {}", service_id, e);
            } else {
                let list = chars_result
                    .Characteristics()
                    .map_err(|e| winrt_error("discover characteristics", e))?;
                for j in 0..list.Size().map_err(|e| winrt_error("discover characteristics", e))? {
                    let c = list
                        .GetAt(j)
                        .map_err(|e| winrt_error("discover characteristics", e))?;
                    let characteristic_id =
                        from_guid(c.Uuid().map_err(|e| winrt_error("discover characteristics", e))?);
                    let properties = map_properties(
                        c.CharacteristicProperties()
                            .map_err(|e| winrt_error("discover characteristics", e))?,
                    );
                    characteristics.push(CharacteristicDescriptor {
                        characteristic_id,
                        properties,
                    });
                    found.insert(characteristic_id, c);
                }
            }

            descriptors.push(ServiceDescriptor {
                service_id,
                characteristics,
            });
        }

        debug!("Cached {} characteristics", found.len());
        if let Ok(mut cache) = self.characteristics.lock() {
            *cache = found;
        }
        Ok(descriptors)
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        capacity: usize,
    ) -> TransportResult<mpsc::Receiver<TransportEvent>> {
        let gatt = self.characteristic(characteristic)?;
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let feed = NotificationFeed::new(sender);

        let value_feed = feed.clone();
        let value_token = gatt
            .ValueChanged(&TypedEventHandler::new(
                move |_: windows::core::Ref<GattCharacteristic>,
                      args: windows::core::Ref<GattValueChangedEventArgs>| {
                    if let Some(args) = args.as_ref() {
                        let buffer = args.CharacteristicValue()?;
                        let reader = DataReader::FromBuffer(&buffer)?;
                        let mut bytes = vec![0u8; reader.UnconsumedBufferLength()? as usize];
                        reader.ReadBytes(&mut bytes)?;
                        value_feed.push(bytes);
                    }
                    Ok(())
                },
            ))
            .map_err(|e| winrt_error("subscribe", e))?;

        let status_feed = feed;
        let status_token = self
            .device
            .ConnectionStatusChanged(&TypedEventHandler::new(
                move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
                    if let Some(dev) = dev.as_ref() {
                        if dev.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                            status_feed.close_with_disconnect();
                        }
                    }
                    Ok(())
                },
            ))
            .map_err(|e| winrt_error("subscribe", e))?;

        let status = gatt
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )
            .map_err(|e| winrt_error("subscribe", e))?
            .await
            .map_err(|e| winrt_error("subscribe", e))?;
        if let Err(e) = check_status("subscribe", status) {
            let _ = gatt.RemoveValueChanged(value_token);
            let _ = self.device.RemoveConnectionStatusChanged(status_token);
            return Err(e);
        }

        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.insert(
                characteristic,
                Subscription {
                    characteristic: gatt,
                    value_token,
                    status_token,
                },
            );
        }
        info!("Notifications enabled on {}", characteristic);
        Ok(receiver)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> TransportResult<()> {
        let gatt = self.characteristic(characteristic)?;
        let writer = DataWriter::new().map_err(|e| winrt_error("write", e))?;
        writer.WriteBytes(data).map_err(|e| winrt_error("write", e))?;
        let buffer = writer.DetachBuffer().map_err(|e| winrt_error("write", e))?;

        let status = gatt
            .WriteValueAsync(&buffer)
            .map_err(|e| winrt_error("write", e))?
            .await
            .map_err(|e| winrt_error("write", e))?;
        check_status("write", status)
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> TransportResult<()> {
        let subscription = self
            .subscriptions
            .lock()
            .map_err(|_| TransportError::operation("unsubscribe", "subscription table poisoned"))?
            .remove(&characteristic)
            .ok_or_else(|| TransportError::operation("unsubscribe", "not subscribed"))?;

        let _ = subscription
            .characteristic
            .RemoveValueChanged(subscription.value_token);
        let _ = self
            .device
            .RemoveConnectionStatusChanged(subscription.status_token);

        let status = subscription
            .characteristic
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::None,
            )
            .map_err(|e| winrt_error("unsubscribe", e))?
            .await
            .map_err(|e| winrt_error("unsubscribe", e))?;
        check_status("unsubscribe", status)
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if let Ok(mut cache) = self.characteristics.lock() {
            cache.clear();
        }
        self.device.Close().map_err(|e| winrt_error("disconnect", e))?;
        info!("Disconnected from device");
        Ok(())
    }
}
