//! Platform seam: the BLE stack as seen by the engine.
//!
//! A backend (BlueZ GATT server, a SoftDevice, a mobile OS bridge, ...)
//! implements [`PeripheralTransport`] and feeds every stack callback into
//! [`HidPeripheral::handle_event`](crate::peripheral::HidPeripheral::handle_event)
//! as a [`PeripheralEvent`]. No call here may block: completion is always
//! reported back as an event.

use alloc::vec::Vec;

use uuid::Uuid;

use super::advertising::AdvertisingParams;
use super::gatt::{AttributeHandle, Service};
use super::DeviceAddress;
use crate::error::TransportError;

/// What the local adapter can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdapterInfo {
    pub present: bool,
    pub enabled: bool,
    pub advertising_supported: bool,
}

impl AdapterInfo {
    pub const READY: Self = Self {
        present: true,
        enabled: true,
        advertising_supported: true,
    };
}

/// Link-layer state reported with a connection event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Remote bond state as known by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BondState {
    None,
    Bonding,
    Bonded,
}

/// ATT status carried by a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GattStatus {
    Success,
    InvalidHandle,
    WriteNotPermitted,
    RequestNotSupported,
    InvalidOffset,
    Failure,
}

impl GattStatus {
    /// ATT error code (BLE Core Vol 3, Part F, 3.4.1.1).
    pub const fn code(self) -> u8 {
        match self {
            GattStatus::Success => 0x00,
            GattStatus::InvalidHandle => 0x01,
            GattStatus::WriteNotPermitted => 0x03,
            GattStatus::RequestNotSupported => 0x06,
            GattStatus::InvalidOffset => 0x07,
            GattStatus::Failure => 0x0E,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, GattStatus::Success)
    }
}

/// A host read of a characteristic value or descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadRequest {
    pub device: DeviceAddress,
    pub request_id: u32,
    pub offset: u16,
    pub handle: AttributeHandle,
}

/// A host write of a characteristic value or descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    pub device: DeviceAddress,
    pub request_id: u32,
    pub handle: AttributeHandle,
    pub prepared: bool,
    pub response_needed: bool,
    pub offset: u16,
    pub value: Vec<u8>,
}

/// Reply to a [`ReadRequest`] or [`WriteRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub device: DeviceAddress,
    pub request_id: u32,
    pub status: GattStatus,
    pub offset: u16,
    pub value: Vec<u8>,
}

/// Stack callbacks delivered to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeripheralEvent {
    ConnectionStateChanged {
        device: DeviceAddress,
        status: u8,
        link: LinkState,
        bond: BondState,
    },
    BondStateChanged {
        device: DeviceAddress,
        bond: BondState,
    },
    ServiceAdded {
        status: GattStatus,
        service: Uuid,
    },
    AdvertisingStarted,
    AdvertisingFailed {
        code: u8,
    },
    CharacteristicRead(ReadRequest),
    DescriptorRead(ReadRequest),
    CharacteristicWrite(WriteRequest),
    DescriptorWrite(WriteRequest),
}

/// Operations the engine issues against the platform BLE stack.
///
/// Methods take `&self`; backends keep their own interior state. The
/// engine calls them only from its serialized executor, never
/// concurrently.
pub trait PeripheralTransport {
    fn adapter_info(&self) -> AdapterInfo;

    /// Open the GATT server. Called once, at engine construction.
    fn open_server(&self) -> Result<(), TransportError>;

    fn close_server(&self);

    /// Register a service. Completion arrives as
    /// [`PeripheralEvent::ServiceAdded`].
    fn add_service(&self, service: &Service) -> Result<(), TransportError>;

    /// Completion arrives as [`PeripheralEvent::AdvertisingStarted`] or
    /// [`PeripheralEvent::AdvertisingFailed`].
    fn start_advertising(&self, params: &AdvertisingParams) -> Result<(), TransportError>;

    fn stop_advertising(&self) -> Result<(), TransportError>;

    /// Request a link to `device`; `auto_connect` keeps the request armed
    /// until the host comes back in range.
    fn connect(&self, device: DeviceAddress, auto_connect: bool) -> Result<(), TransportError>;

    fn cancel_connection(&self, device: DeviceAddress) -> Result<(), TransportError>;

    fn set_pairing_confirmation(
        &self,
        device: DeviceAddress,
        accept: bool,
    ) -> Result<(), TransportError>;

    /// Start bonding. Completion arrives as
    /// [`PeripheralEvent::BondStateChanged`].
    fn create_bond(&self, device: DeviceAddress) -> Result<(), TransportError>;

    /// Send a handle-value notification (no confirmation).
    fn notify(
        &self,
        device: DeviceAddress,
        handle: AttributeHandle,
        value: &[u8],
    ) -> Result<(), TransportError>;

    fn send_response(&self, response: &Response) -> Result<(), TransportError>;
}
