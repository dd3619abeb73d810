//! Unified error type for blehid.
//!
//! All variants carry only fixed-size data so errors stay `Copy` and can
//! be formatted with `defmt` on target.

use thiserror::Error;

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The platform cannot host a BLE HID peripheral. Fatal; recreate the
    /// engine after remediation.
    #[error("BLE peripheral unsupported: {0}")]
    Unsupported(#[from] UnsupportedReason),

    /// The transport rejected an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A bounded retry policy ran out of attempts registering a service.
    #[error("service {service:#06x} not registered after {attempts} attempts")]
    ServiceRegistration { service: u16, attempts: u32 },

    /// The GATT server was closed by `stop_advertising`.
    #[error("GATT server closed")]
    ServerClosed,
}

/// Why the engine could not be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnsupportedReason {
    #[error("Bluetooth is not available")]
    AdapterMissing,
    #[error("Bluetooth is disabled")]
    AdapterDisabled,
    #[error("BLE advertising not supported on this device")]
    AdvertisingUnsupported,
    #[error("GATT server could not be opened")]
    ServerOpenFailed,
}

/// Errors a [`PeripheralTransport`](crate::ble::transport::PeripheralTransport)
/// reports back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The stack is busy with another operation; the call may be retried.
    #[error("transport busy")]
    Busy,
    /// The stack refused the call with a raw status code.
    #[error("rejected with status {0:#04x}")]
    Rejected(u8),
    /// The remote device is not connected.
    #[error("device not connected")]
    NotConnected,
    /// The server or adapter has been shut down.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_converts() {
        let err: Error = TransportError::Busy.into();
        assert_eq!(err, Error::Transport(TransportError::Busy));
    }

    #[test]
    fn unsupported_reason_converts() {
        let err: Error = UnsupportedReason::AdapterDisabled.into();
        assert!(matches!(
            err,
            Error::Unsupported(UnsupportedReason::AdapterDisabled)
        ));
    }

    #[test]
    fn registration_error_formats_service() {
        let err = Error::ServiceRegistration {
            service: 0x1812,
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "service 0x1812 not registered after 3 attempts"
        );
    }
}
