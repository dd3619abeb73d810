//! Device Information service strings.

use heapless::String;

use crate::config::{
    DEFAULT_DEVICE_NAME, DEFAULT_MANUFACTURER, DEFAULT_SERIAL_NUMBER, DEVICE_INFO_MAX_LENGTH,
};

/// A Device Information string, at most [`DEVICE_INFO_MAX_LENGTH`] UTF-8 bytes.
pub type InfoString = String<DEVICE_INFO_MAX_LENGTH>;

/// Longest prefix of `value` that fits the cap without splitting a
/// character.
pub fn truncate(value: &str) -> InfoString {
    let mut end = value.len().min(DEVICE_INFO_MAX_LENGTH);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = InfoString::new();
    // Cannot fail: `end` is within capacity.
    let _ = out.push_str(&value[..end]);
    out
}

/// Strings served by the Device Information service. `device_name` is
/// served as the Model Number and used as the advertised name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: InfoString,
    pub device_name: InfoString,
    pub serial_number: InfoString,
}

impl DeviceInfo {
    pub fn set_manufacturer(&mut self, value: &str) {
        self.manufacturer = truncate(value);
    }

    pub fn set_device_name(&mut self, value: &str) {
        self.device_name = truncate(value);
    }

    pub fn set_serial_number(&mut self, value: &str) {
        self.serial_number = truncate(value);
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            manufacturer: truncate(DEFAULT_MANUFACTURER),
            device_name: truncate(DEFAULT_DEVICE_NAME),
            serial_number: truncate(DEFAULT_SERIAL_NUMBER),
        }
    }
}
