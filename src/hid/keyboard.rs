//! Keyboard profile: boot-protocol keyboard reports and the text encoder.
//!
//! Layout (8 bytes):
//! ```text
//! Byte 0: Modifier keys (bitfield)
//!         Bit 0 = Left Ctrl,  Bit 1 = Left Shift,
//!         Bit 2 = Left Alt,   Bit 3 = Left GUI,
//!         Bit 4 = Right Ctrl, Bit 5 = Right Shift,
//!         Bit 6 = Right Alt,  Bit 7 = Right GUI
//! Byte 1: Reserved (0x00)
//! Byte 2-7: Up to 6 simultaneous key codes (USB HID usage codes)
//! ```
//!
//! Text is typed one key at a time: a press report, then a release
//! report. Repeated characters get an extra release first so the host
//! sees a fresh edge instead of a held key.

use alloc::vec::Vec;
use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use log::info;

use super::HidProfile;
use crate::config::PeripheralConfig;

/// Keyboard report size in bytes.
pub const KEYBOARD_REPORT_SIZE: usize = 8;

// Modifier bits

pub const MODIFIER_KEY_NONE: u8 = 0;
pub const MODIFIER_KEY_CTRL: u8 = 1;
pub const MODIFIER_KEY_SHIFT: u8 = 2;
pub const MODIFIER_KEY_ALT: u8 = 4;

// Named keys (USB HID Keyboard/Keypad page)

pub const KEY_F1: u8 = 0x3A;
pub const KEY_F2: u8 = 0x3B;
pub const KEY_F3: u8 = 0x3C;
pub const KEY_F4: u8 = 0x3D;
pub const KEY_F5: u8 = 0x3E;
pub const KEY_F6: u8 = 0x3F;
pub const KEY_F7: u8 = 0x40;
pub const KEY_F8: u8 = 0x41;
pub const KEY_F9: u8 = 0x42;
pub const KEY_F10: u8 = 0x43;
pub const KEY_F11: u8 = 0x44;
pub const KEY_F12: u8 = 0x45;
pub const KEY_PRINT_SCREEN: u8 = 0x46;
pub const KEY_SCROLL_LOCK: u8 = 0x47;
pub const KEY_CAPS_LOCK: u8 = 0x39;
pub const KEY_NUM_LOCK: u8 = 0x53;
pub const KEY_INSERT: u8 = 0x49;
pub const KEY_HOME: u8 = 0x4A;
pub const KEY_PAGE_UP: u8 = 0x4B;
pub const KEY_PAGE_DOWN: u8 = 0x4E;
pub const KEY_RIGHT_ARROW: u8 = 0x4F;
pub const KEY_LEFT_ARROW: u8 = 0x50;
pub const KEY_DOWN_ARROW: u8 = 0x51;
pub const KEY_UP_ARROW: u8 = 0x52;

/// Standard USB HID boot-protocol keyboard report.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    /// Modifier key bitfield.
    pub modifier: u8,
    /// Reserved byte (always 0x00 per HID spec).
    pub reserved: u8,
    /// Up to 6 simultaneously pressed key codes.
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    /// Create an empty (all-keys-released) report.
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            reserved: 0,
            keycodes: [0; 6],
        }
    }

    /// Single key press with `modifier` held.
    pub const fn key(modifier: u8, keycode: u8) -> Self {
        Self {
            modifier,
            reserved: 0,
            keycodes: [keycode, 0, 0, 0, 0, 0],
        }
    }

    /// Serialise into a byte slice.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < KEYBOARD_REPORT_SIZE {
            return 0;
        }
        buf[0] = self.modifier;
        buf[1] = self.reserved;
        buf[2..8].copy_from_slice(&self.keycodes);
        KEYBOARD_REPORT_SIZE
    }

    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        self.serialize(&mut buf);
        buf
    }

    /// Returns `true` if no keys are pressed (release event).
    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes.iter().all(|&k| k == 0)
    }
}

/// Modifier needed to type `ch`.
pub fn modifier_for(ch: char) -> u8 {
    match ch {
        'A'..='Z'
        | '!' | '@' | '#' | '$' | '%' | '^' | '&' | '*' | '(' | ')'
        | '_' | '+' | '{' | '}' | '|' | ':' | '"' | '~' | '<' | '>' | '?' => MODIFIER_KEY_SHIFT,
        _ => MODIFIER_KEY_NONE,
    }
}

/// USB HID usage code of the key that produces `ch` (0 if none).
pub fn keycode_for(ch: char) -> u8 {
    match ch {
        'a'..='z' => 0x04 + (ch as u8 - b'a'),
        'A'..='Z' => 0x04 + (ch as u8 - b'A'),
        '1' | '!' => 0x1E,
        '2' | '@' => 0x1F,
        '3' | '#' => 0x20,
        '4' | '$' => 0x21,
        '5' | '%' => 0x22,
        '6' | '^' => 0x23,
        '7' | '&' => 0x24,
        '8' | '*' => 0x25,
        '9' | '(' => 0x26,
        '0' | ')' => 0x27,
        '\n' => 0x28, // Enter
        '\u{8}' => 0x2A, // Backspace
        '\t' => 0x2B,
        ' ' => 0x2C,
        '-' | '_' => 0x2D,
        '=' | '+' => 0x2E,
        '[' | '{' => 0x2F,
        ']' | '}' => 0x30,
        '\\' | '|' => 0x31,
        ';' | ':' => 0x33,
        '\'' | '"' => 0x34,
        '`' | '~' => 0x35,
        ',' | '<' => 0x36,
        '.' | '>' => 0x37,
        '/' | '?' => 0x38,
        _ => 0,
    }
}

/// Report sequence that types `text`, ending with a trailing release.
pub fn type_text(text: &str) -> Vec<KeyboardReport> {
    let mut reports = Vec::with_capacity(text.len() * 2 + 1);
    let mut last: Option<char> = None;
    for ch in text.chars() {
        if last == Some(ch) {
            reports.push(KeyboardReport::empty());
        }
        reports.push(KeyboardReport::key(modifier_for(ch), keycode_for(ch)));
        reports.push(KeyboardReport::empty());
        last = Some(ch);
    }
    reports.push(KeyboardReport::empty());
    reports
}

/// LED state written by the host into the output report.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardLeds {
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
    pub compose: bool,
    pub kana: bool,
}

impl KeyboardLeds {
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            num_lock: bits & 0x01 != 0,
            caps_lock: bits & 0x02 != 0,
            scroll_lock: bits & 0x04 != 0,
            compose: bits & 0x08 != 0,
            kana: bits & 0x10 != 0,
        }
    }
}

/// Keyboard personality. Tracks the LED state last written by the host.
pub struct Keyboard {
    leds: Mutex<CriticalSectionRawMutex, Cell<KeyboardLeds>>,
}

impl Keyboard {
    pub const fn new() -> Self {
        Self {
            leds: Mutex::new(Cell::new(KeyboardLeds::from_bits(0))),
        }
    }

    pub fn leds(&self) -> KeyboardLeds {
        self.leds.lock(|l| l.get())
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl HidProfile for Keyboard {
    const CONFIG: PeripheralConfig = PeripheralConfig::KEYBOARD;

    fn report_map(&self) -> &'static [u8] {
        KEYBOARD_REPORT_MAP
    }

    fn on_output_report(&self, report: &[u8]) {
        let Some(&bits) = report.first() else {
            return;
        };
        let leds = KeyboardLeds::from_bits(bits);
        self.leds.lock(|l| l.set(leds));
        info!("keyboard LEDs: {:?}", leds);
    }
}

/// HID Report Descriptor for a boot-protocol keyboard:
///   - 8 modifier key bits (input)
///   - 1 reserved byte
///   - 5 LED indicators (output)
///   - 6 key code bytes (input, usages 0x00-0x65)
#[rustfmt::skip]
pub const KEYBOARD_REPORT_MAP: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    //
    //   - Modifier keys (8 bits) -
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0, //   Usage Minimum (Left Control)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    //   - Reserved byte -
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant)
    //
    //   - LED output (5 bits + 3 padding) -
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (Num Lock)
    0x29, 0x05, //   Usage Maximum (Kana)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant)
    //
    //   - Key codes (6 bytes) -
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x65, //   Logical Maximum (101)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x65, //   Usage Maximum (101)
    0x81, 0x00, //   Input (Data, Array)
    //
    0xC0, // End Collection
];
