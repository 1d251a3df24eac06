//! BLE GATT service layout for the wlink command channel
//!
//! The layout is the Nordic UART Service so that generic "BLE UART" terminal
//! apps can talk to the bridge without a custom client.

use uuid::Uuid;

/// Primary service: 6e400001-b5a3-f393-e0a9-e50e24dcca9e
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Command characteristic (write, encrypted link required)
pub const COMMAND_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Output characteristic (notify)
pub const OUTPUT_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// ATT MTU every LE link starts with before an exchange
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Opcode + attribute handle that every notification spends out of the MTU
pub const ATT_NOTIFY_OVERHEAD: usize = 3;

/// Largest attribute value the ATT protocol allows
pub const MAX_ATTRIBUTE_LEN: usize = 512;

/// Notification payload available on a link with the given ATT MTU
pub fn notify_payload(att_mtu: u16) -> usize {
    (att_mtu as usize)
        .saturating_sub(ATT_NOTIFY_OVERHEAD)
        .min(MAX_ATTRIBUTE_LEN)
}
