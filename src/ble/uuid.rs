//! Bluetooth assigned-number UUIDs.
//!
//! 16-bit assigned numbers live in bits 96..112 of the Bluetooth Base
//! UUID `00000000-0000-1000-8000-00805F9B34FB`. Remote stacks may present
//! either the full base form or a bare "short-style" value with every
//! other bit cleared, so comparisons go through [`matches`].

use uuid::Uuid;

const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;
const SHORT_FIELD_MASK: u128 = 0x0000_FFFF_0000_0000_0000_0000_0000_0000;
const SHORT_FIELD_SHIFT: u32 = 96;

/// Embed a 16-bit assigned number into the Bluetooth Base UUID.
pub const fn from_short(value: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID | ((value as u128) << SHORT_FIELD_SHIFT))
}

/// Extract the 16-bit assigned-number field.
pub const fn short_value(uuid: &Uuid) -> u16 {
    ((uuid.as_u128() & SHORT_FIELD_MASK) >> SHORT_FIELD_SHIFT) as u16
}

/// `true` if every bit outside the 16-bit field is zero.
pub const fn is_short_style(uuid: &Uuid) -> bool {
    uuid.as_u128() & !SHORT_FIELD_MASK == 0
}

/// Compare two UUIDs, looking only at the 16-bit field when either side
/// is short-style.
pub fn matches(a: &Uuid, b: &Uuid) -> bool {
    if is_short_style(a) || is_short_style(b) {
        short_value(a) == short_value(b)
    } else {
        a == b
    }
}

// Services
pub const DEVICE_INFORMATION_SERVICE: Uuid = from_short(0x180A);
pub const BATTERY_SERVICE: Uuid = from_short(0x180F);
pub const HID_SERVICE: Uuid = from_short(0x1812);

// Device Information characteristics
pub const MANUFACTURER_NAME: Uuid = from_short(0x2A29);
pub const MODEL_NUMBER: Uuid = from_short(0x2A24);
pub const SERIAL_NUMBER: Uuid = from_short(0x2A25);

// Battery characteristics
pub const BATTERY_LEVEL: Uuid = from_short(0x2A19);

// HID characteristics
pub const HID_INFORMATION: Uuid = from_short(0x2A4A);
pub const REPORT_MAP: Uuid = from_short(0x2A4B);
pub const HID_CONTROL_POINT: Uuid = from_short(0x2A4C);
pub const REPORT: Uuid = from_short(0x2A4D);
pub const PROTOCOL_MODE: Uuid = from_short(0x2A4E);

// Descriptors
pub const REPORT_REFERENCE: Uuid = from_short(0x2908);
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = from_short(0x2902);
