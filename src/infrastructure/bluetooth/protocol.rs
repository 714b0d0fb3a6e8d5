//! Conversions between WinRT values and the transport-neutral models

use crate::domain::error::TransportError;
use crate::domain::models::CharacteristicProperties;
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristicProperties, GattCommunicationStatus,
};

pub fn to_guid(id: Uuid) -> GUID {
    GUID::from_u128(id.as_u128())
}

pub fn from_guid(guid: GUID) -> Uuid {
    Uuid::from_u128(guid.to_u128())
}

/// Format a 48-bit Bluetooth address as `AA:BB:CC:DD:EE:FF`
pub fn format_address(address: u64) -> String {
    let bytes = address.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn parse_address(text: &str) -> Result<u64, TransportError> {
    let hex: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 {
        return Err(TransportError::operation(
            "connect",
            format!("invalid Bluetooth address {:?}", text),
        ));
    }
    u64::from_str_radix(&hex, 16).map_err(|e| {
        TransportError::operation("connect", format!("invalid Bluetooth address {:?}: {}", text, e))
    })
}

pub fn map_properties(props: GattCharacteristicProperties) -> CharacteristicProperties {
    let table = [
        (GattCharacteristicProperties::Read, CharacteristicProperties::READ),
        (GattCharacteristicProperties::Write, CharacteristicProperties::WRITE),
        (
            GattCharacteristicProperties::WriteWithoutResponse,
            CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
        ),
        (GattCharacteristicProperties::Notify, CharacteristicProperties::NOTIFY),
        (GattCharacteristicProperties::Indicate, CharacteristicProperties::INDICATE),
    ];

    let mut mapped = CharacteristicProperties::empty();
    for (flag, property) in table {
        if props.0 & flag.0 != 0 {
            mapped.insert(property);
        }
    }
    mapped
}

/// Turn a non-success GATT status into an error.
///
/// `Unreachable` means the link is gone and is reported with the word
/// "disconnected" so write failures classify as link loss.
pub fn check_status(
    operation: &'static str,
    status: GattCommunicationStatus,
) -> Result<(), TransportError> {
    if status == GattCommunicationStatus::Success {
        Ok(())
    } else if status == GattCommunicationStatus::Unreachable {
        Err(TransportError::operation(operation, "device disconnected (unreachable)"))
    } else {
        Err(TransportError::operation(operation, format!("GATT status {:?}", status)))
    }
}

pub fn winrt_error(operation: &'static str, e: windows::core::Error) -> TransportError {
    TransportError::operation(operation, e.message().to_string())
}
