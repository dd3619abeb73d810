//! Bluetooth Low Energy subsystem.
//!
//! This module models the peripheral (GATT server) role of HID over GATT:
//!
//! 1. **GATT database** - attribute table for the Battery, HID and Device
//!    Information services ([`gatt`]).
//! 2. **Advertising** - connectable advertisement parameters and the raw
//!    AD-structure payloads ([`advertising`]).
//! 3. **Connection manager** - the connect/bond/reconnect state machine
//!    ([`connection`]) and the set of bonded, connected hosts ([`registry`]).
//! 4. **Dispatcher** - answers read/write requests from hosts
//!    ([`dispatcher`]).
//!
//! The platform stack sits behind [`transport::PeripheralTransport`].

pub mod advertising;
pub mod connection;
pub mod device_info;
pub mod dispatcher;
pub mod gatt;
pub mod registry;
pub mod transport;
pub mod uuid;

use core::fmt;

/// 48-bit Bluetooth device address of a remote host.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress(pub [u8; 6]);

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceAddress;

    #[test]
    fn address_formats_as_colon_hex() {
        let addr = DeviceAddress([0xAA, 0x01, 0x02, 0x0B, 0xFF, 0x00]);
        assert_eq!(addr.to_string(), "AA:01:02:0B:FF:00");
        assert_eq!(format!("{addr:?}"), "AA:01:02:0B:FF:00");
    }
}
