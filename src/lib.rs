//! BLE HID-over-GATT peripheral engine.
//!
//! Emulates a keyboard or mouse as a Bluetooth Low Energy peripheral:
//!
//! 1. **GATT database** - Device Information, Battery and HID services
//!    built from a [`PeripheralConfig`] and the profile's report map.
//! 2. **Engine** - [`HidPeripheral`] owns the connection/bonding state
//!    machine, the serialized transport executor, the request dispatcher
//!    and the notification pump.
//! 3. **Profiles** - keyboard and mouse encoders that turn text and
//!    pointer deltas into HID input reports.
//!
//! The platform BLE stack is reached only through
//! [`ble::transport::PeripheralTransport`], so the crate stays `no_std`
//! (with `alloc`) and is fully testable on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod ble;
pub mod config;
pub mod error;
pub mod hid;
pub mod peripheral;

pub use config::{PeripheralConfig, RetryPolicy};
pub use error::{Error, TransportError, UnsupportedReason};
pub use peripheral::{HidPeripheral, KeyboardPeripheral, MousePeripheral, PeripheralCallbacks};
