//! Mouse profile: boot-protocol mouse reports.
//!
//! Layout (4 bytes):
//! ```text
//! Byte 0: Button bitfield
//!         Bit 0 = Left, Bit 1 = Right, Bit 2 = Middle
//! Byte 1: X displacement (signed, -127..127)
//! Byte 2: Y displacement (signed, -127..127)
//! Byte 3: Scroll wheel  (signed, -127..127)
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::HidProfile;
use crate::config::PeripheralConfig;

/// Mouse report size in bytes.
pub const MOUSE_REPORT_SIZE: usize = 4;

pub const BUTTON_LEFT: u8 = 0x01;
pub const BUTTON_RIGHT: u8 = 0x02;
pub const BUTTON_MIDDLE: u8 = 0x04;

/// Standard USB HID boot-protocol mouse report.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MouseReport {
    /// Button bitfield (bit 0 = left, bit 1 = right, bit 2 = middle).
    pub buttons: u8,
    /// Relative X movement (signed).
    pub x: i8,
    /// Relative Y movement (signed).
    pub y: i8,
    /// Scroll wheel delta (signed).
    pub wheel: i8,
}

impl MouseReport {
    /// Create an idle (no movement, no buttons) report.
    pub const fn empty() -> Self {
        Self {
            buttons: 0,
            x: 0,
            y: 0,
            wheel: 0,
        }
    }

    /// Build a report from unclamped deltas; each axis is clamped to
    /// `-127..=127`.
    pub fn new(dx: i32, dy: i32, wheel: i32, left: bool, right: bool, middle: bool) -> Self {
        let mut buttons = 0;
        if left {
            buttons |= BUTTON_LEFT;
        }
        if right {
            buttons |= BUTTON_RIGHT;
        }
        if middle {
            buttons |= BUTTON_MIDDLE;
        }
        Self {
            buttons,
            x: clamp(dx),
            y: clamp(dy),
            wheel: clamp(wheel),
        }
    }

    /// Serialise into a byte slice.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < MOUSE_REPORT_SIZE {
            return 0;
        }
        buf[0] = self.buttons & 0x07;
        buf[1] = self.x as u8;
        buf[2] = self.y as u8;
        buf[3] = self.wheel as u8;
        MOUSE_REPORT_SIZE
    }

    pub fn to_bytes(&self) -> [u8; MOUSE_REPORT_SIZE] {
        let mut buf = [0u8; MOUSE_REPORT_SIZE];
        self.serialize(&mut buf);
        buf
    }

    /// Returns `true` when no buttons are pressed and there is no movement.
    pub fn is_idle(&self) -> bool {
        self.buttons & 0x07 == 0 && self.x == 0 && self.y == 0 && self.wheel == 0
    }
}

fn clamp(value: i32) -> i8 {
    value.clamp(-127, 127) as i8
}

/// Mouse personality. Remembers the last report handed out so idle
/// reports are not repeated.
pub struct Mouse {
    last_sent: Mutex<CriticalSectionRawMutex, Cell<MouseReport>>,
}

impl Mouse {
    pub const fn new() -> Self {
        Self {
            last_sent: Mutex::new(Cell::new(MouseReport::empty())),
        }
    }

    /// Report to send for this motion, or `None` when both it and the
    /// previously sent report are idle.
    pub fn next_report(&self, report: MouseReport) -> Option<MouseReport> {
        self.last_sent.lock(|last| {
            if last.get().is_idle() && report.is_idle() {
                return None;
            }
            last.set(report);
            Some(report)
        })
    }

    pub fn last_sent(&self) -> MouseReport {
        self.last_sent.lock(|last| last.get())
    }
}

impl Default for Mouse {
    fn default() -> Self {
        Self::new()
    }
}

impl HidProfile for Mouse {
    const CONFIG: PeripheralConfig = PeripheralConfig::MOUSE;

    fn report_map(&self) -> &'static [u8] {
        MOUSE_REPORT_MAP
    }

    fn on_output_report(&self, _report: &[u8]) {}
}

/// HID Report Descriptor for a 3-button mouse with scroll wheel.
#[rustfmt::skip]
pub const MOUSE_REPORT_MAP: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    //
    //   - Buttons (3 bits + 5 padding) -
    0x05, 0x09, //     Usage Page (Buttons)
    0x19, 0x01, //     Usage Minimum (Button 1)
    0x29, 0x03, //     Usage Maximum (Button 3)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x03, //     Report Count (3)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0x95, 0x01, //     Report Count (1)
    0x75, 0x05, //     Report Size (5)
    0x81, 0x01, //     Input (Constant)
    //
    //   - X, Y, wheel -
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x09, 0x38, //     Usage (Wheel)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x03, //     Report Count (3)
    0x81, 0x06, //     Input (Data, Variable, Relative)
    //
    0xC0, //   End Collection (Physical)
    0xC0, // End Collection (Application)
];
