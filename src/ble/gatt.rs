//! GATT attribute model and the HOGP service builders.
//!
//! The database is built once per engine from a [`PeripheralConfig`]
//! and the profile's report map. Every characteristic value and
//! descriptor gets a stable [`AttributeHandle`] at build time; the
//! transport names attributes by handle in read/write requests.
//!
//! Services (registration order):
//! ```text
//! Battery (0x180F)            Battery Level [+CCC]
//! HID (0x1812)                HID Information, Report Map, Protocol Mode,
//!                             HID Control Point, Report x {input, output, feature}
//! Device Information (0x180A) Manufacturer, Model Number, Serial Number
//! ```

use alloc::vec;
use alloc::vec::Vec;
use core::ops::BitOr;

use uuid::Uuid;

use super::uuid::{self as ids, matches};
use crate::config::{
    PeripheralConfig, BATTERY_LEVEL_PERCENT, CCC_NOTIFICATIONS_ENABLED, HID_INFORMATION,
};

/// Characteristic property bitmask (BLE Core Vol 3, Part G, 3.3.1.1).
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Properties(u8);

impl Properties {
    pub const BROADCAST: Self = Self(0x01);
    pub const READ: Self = Self(0x02);
    pub const WRITE_NO_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Properties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Attribute access permissions.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Permissions(u8);

impl Permissions {
    pub const READ: Self = Self(0x01);
    pub const READ_ENCRYPTED: Self = Self(0x02);
    pub const WRITE: Self = Self(0x10);
    pub const WRITE_ENCRYPTED: Self = Self(0x20);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Stable 16-bit attribute handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeHandle(pub u16);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub permissions: Permissions,
    pub handle: AttributeHandle,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Properties,
    pub permissions: Permissions,
    /// Handle of the characteristic value.
    pub handle: AttributeHandle,
    pub value: Vec<u8>,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    /// Host may write the value, with or without response.
    pub fn is_writable(&self) -> bool {
        self.properties.contains(Properties::WRITE)
            || self.properties.contains(Properties::WRITE_NO_RESPONSE)
    }
}

impl Descriptor {
    pub fn is_writable(&self) -> bool {
        self.permissions.contains(Permissions::WRITE)
            || self.permissions.contains(Permissions::WRITE_ENCRYPTED)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub handle: AttributeHandle,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| matches(&c.uuid, uuid))
    }
}

/// A resolved attribute handle.
#[derive(Clone, Copy, Debug)]
pub enum Attribute<'a> {
    Characteristic(&'a Characteristic),
    Descriptor {
        owner: &'a Characteristic,
        descriptor: &'a Descriptor,
    },
}

/// Hands out consecutive attribute handles starting at 1.
struct HandleAllocator {
    next: u16,
}

impl HandleAllocator {
    fn new() -> Self {
        Self { next: 1 }
    }

    fn next(&mut self) -> AttributeHandle {
        let handle = AttributeHandle(self.next);
        self.next = self.next.wrapping_add(1);
        handle
    }
}

/// Incremental builder for one service.
struct ServiceBuilder<'a> {
    handles: &'a mut HandleAllocator,
    service: Service,
}

impl<'a> ServiceBuilder<'a> {
    fn new(handles: &'a mut HandleAllocator, uuid: Uuid) -> Self {
        let handle = handles.next();
        Self {
            handles,
            service: Service {
                uuid,
                handle,
                characteristics: Vec::new(),
            },
        }
    }

    fn characteristic(
        mut self,
        uuid: Uuid,
        properties: Properties,
        permissions: Permissions,
        value: &[u8],
        descriptors: &[(Uuid, Permissions, &[u8])],
    ) -> Self {
        let handle = self.handles.next();
        let descriptors = descriptors
            .iter()
            .map(|&(uuid, permissions, value)| Descriptor {
                uuid,
                permissions,
                handle: self.handles.next(),
                value: value.to_vec(),
            })
            .collect();
        self.service.characteristics.push(Characteristic {
            uuid,
            properties,
            permissions,
            handle,
            value: value.to_vec(),
            descriptors,
        });
        self
    }

    fn build(self) -> Service {
        self.service
    }
}

const NO_VALUE: &[u8] = &[];
const CCC_ENABLED: &[u8] = &CCC_NOTIFICATIONS_ENABLED;

const ENCRYPTED_RW: Permissions = Permissions(
    Permissions::READ_ENCRYPTED.bits() | Permissions::WRITE_ENCRYPTED.bits(),
);

/// Input Report: host subscribes for notifications.
pub const INPUT_REPORT_PROPERTIES: Properties =
    Properties(Properties::NOTIFY.0 | Properties::READ.0 | Properties::WRITE.0);
/// Output Report: host writes (e.g. keyboard LEDs).
pub const OUTPUT_REPORT_PROPERTIES: Properties =
    Properties(Properties::READ.0 | Properties::WRITE.0 | Properties::WRITE_NO_RESPONSE.0);
/// Feature Report.
pub const FEATURE_REPORT_PROPERTIES: Properties =
    Properties(Properties::READ.0 | Properties::WRITE.0);

fn device_information_service(handles: &mut HandleAllocator) -> Service {
    ServiceBuilder::new(handles, ids::DEVICE_INFORMATION_SERVICE)
        .characteristic(
            ids::MANUFACTURER_NAME,
            Properties::READ,
            Permissions::READ_ENCRYPTED,
            &[],
            &[],
        )
        .characteristic(
            ids::MODEL_NUMBER,
            Properties::READ,
            Permissions::READ_ENCRYPTED,
            &[],
            &[],
        )
        .characteristic(
            ids::SERIAL_NUMBER,
            Properties::READ,
            Permissions::READ_ENCRYPTED,
            &[],
            &[],
        )
        .build()
}

fn battery_service(handles: &mut HandleAllocator) -> Service {
    ServiceBuilder::new(handles, ids::BATTERY_SERVICE)
        .characteristic(
            ids::BATTERY_LEVEL,
            Properties::NOTIFY | Properties::READ,
            Permissions::READ_ENCRYPTED,
            &[BATTERY_LEVEL_PERCENT],
            &[(
                ids::CLIENT_CHARACTERISTIC_CONFIG,
                Permissions::READ | Permissions::WRITE,
                CCC_ENABLED,
            )],
        )
        .build()
}

fn hid_service(
    handles: &mut HandleAllocator,
    config: &PeripheralConfig,
    report_map: &[u8],
) -> Service {
    let mut builder = ServiceBuilder::new(handles, ids::HID_SERVICE)
        .characteristic(
            ids::HID_INFORMATION,
            Properties::READ,
            Permissions::READ_ENCRYPTED,
            &HID_INFORMATION,
            &[],
        )
        .characteristic(
            ids::REPORT_MAP,
            Properties::READ,
            Permissions::READ_ENCRYPTED,
            report_map,
            &[],
        )
        .characteristic(
            ids::PROTOCOL_MODE,
            Properties::READ | Properties::WRITE_NO_RESPONSE,
            ENCRYPTED_RW,
            &[],
            &[],
        )
        .characteristic(
            ids::HID_CONTROL_POINT,
            Properties::WRITE_NO_RESPONSE,
            Permissions::WRITE_ENCRYPTED,
            &[],
            &[],
        );

    if config.need_input_report {
        builder = builder.characteristic(
            ids::REPORT,
            INPUT_REPORT_PROPERTIES,
            ENCRYPTED_RW,
            &[],
            &[
                (ids::CLIENT_CHARACTERISTIC_CONFIG, ENCRYPTED_RW, CCC_ENABLED),
                (ids::REPORT_REFERENCE, ENCRYPTED_RW, NO_VALUE),
            ],
        );
    }
    if config.need_output_report {
        builder = builder.characteristic(
            ids::REPORT,
            OUTPUT_REPORT_PROPERTIES,
            ENCRYPTED_RW,
            &[],
            &[(ids::REPORT_REFERENCE, ENCRYPTED_RW, NO_VALUE)],
        );
    }
    if config.need_feature_report {
        builder = builder.characteristic(
            ids::REPORT,
            FEATURE_REPORT_PROPERTIES,
            ENCRYPTED_RW,
            &[],
            &[(ids::REPORT_REFERENCE, ENCRYPTED_RW, NO_VALUE)],
        );
    }
    builder.build()
}

/// The peripheral's local attribute table.
#[derive(Clone, Debug)]
pub struct GattDatabase {
    /// Battery, HID, Device Information; this is also the registration order.
    services: Vec<Service>,
}

impl GattDatabase {
    pub fn build(config: &PeripheralConfig, report_map: &[u8]) -> Self {
        let mut handles = HandleAllocator::new();
        let services = vec![
            battery_service(&mut handles),
            hid_service(&mut handles, config, report_map),
            device_information_service(&mut handles),
        ];
        Self { services }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, uuid: &Uuid) -> Option<&Service> {
        self.services.iter().find(|s| matches(&s.uuid, uuid))
    }

    pub fn attribute(&self, handle: AttributeHandle) -> Option<Attribute<'_>> {
        for characteristic in self.services.iter().flat_map(|s| &s.characteristics) {
            if characteristic.handle == handle {
                return Some(Attribute::Characteristic(characteristic));
            }
            if let Some(descriptor) = characteristic.descriptors.iter().find(|d| d.handle == handle)
            {
                return Some(Attribute::Descriptor {
                    owner: characteristic,
                    descriptor,
                });
            }
        }
        None
    }

    /// Overwrite the stored value of a characteristic or descriptor.
    /// Returns `false` for an unknown handle.
    pub fn set_value(&mut self, handle: AttributeHandle, value: &[u8]) -> bool {
        for characteristic in self.services.iter_mut().flat_map(|s| &mut s.characteristics) {
            if characteristic.handle == handle {
                characteristic.value = value.to_vec();
                return true;
            }
            if let Some(descriptor) = characteristic
                .descriptors
                .iter_mut()
                .find(|d| d.handle == handle)
            {
                descriptor.value = value.to_vec();
                return true;
            }
        }
        false
    }

    /// Value handle of the Input Report characteristic, if configured.
    pub fn input_report(&self) -> Option<AttributeHandle> {
        self.report_with(INPUT_REPORT_PROPERTIES)
    }

    pub fn output_report(&self) -> Option<AttributeHandle> {
        self.report_with(OUTPUT_REPORT_PROPERTIES)
    }

    pub fn feature_report(&self) -> Option<AttributeHandle> {
        self.report_with(FEATURE_REPORT_PROPERTIES)
    }

    fn report_with(&self, properties: Properties) -> Option<AttributeHandle> {
        self.service(&ids::HID_SERVICE)?
            .characteristics
            .iter()
            .find(|c| matches(&c.uuid, &ids::REPORT) && c.properties == properties)
            .map(|c| c.handle)
    }
}
