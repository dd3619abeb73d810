//! Advertisement parameters for the HID peripheral.
//!
//! The advertisement is connectable, never times out, uses high TX power
//! and the low-latency interval. Both the advertising data and the scan
//! response carry the three service UUIDs; only the advertising data
//! carries the device name. [`AdvertisingData::encode`] produces the raw
//! legacy AD-structure payload for stacks that take bytes.

use heapless::{String, Vec};
use uuid::Uuid;

use super::uuid::{self as ids, is_short_style, short_value};
use crate::config::DEVICE_INFO_MAX_LENGTH;

/// Legacy advertising PDU payload limit.
pub const MAX_AD_PAYLOAD: usize = 31;

// AD types (Bluetooth Assigned Numbers, 2.3)
const AD_FLAGS: u8 = 0x01;
const AD_COMPLETE_16BIT_UUIDS: u8 = 0x03;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TX_POWER: u8 = 0x0A;

/// LE General Discoverable | BR/EDR Not Supported.
const FLAGS_LE_ONLY_GENERAL_DISC: u8 = 0x06;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

impl TxPowerLevel {
    /// Nominal radiated power in dBm.
    pub const fn dbm(self) -> i8 {
        match self {
            TxPowerLevel::UltraLow => -21,
            TxPowerLevel::Low => -15,
            TxPowerLevel::Medium => -7,
            TxPowerLevel::High => 1,
        }
    }
}

/// One advertising (or scan response) payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingData {
    pub include_device_name: bool,
    pub include_tx_power: bool,
    pub service_uuids: Vec<Uuid, 3>,
}

impl AdvertisingData {
    /// Encode as AD structures (`len, type, data...`).
    ///
    /// 16-bit service UUIDs go into one "complete list" structure. A name
    /// that does not fit is cut and sent as a shortened local name.
    pub fn encode(
        &self,
        device_name: &str,
        tx_power: TxPowerLevel,
        with_flags: bool,
    ) -> Vec<u8, MAX_AD_PAYLOAD> {
        let mut out: Vec<u8, MAX_AD_PAYLOAD> = Vec::new();

        if with_flags {
            let _ = out.extend_from_slice(&[2, AD_FLAGS, FLAGS_LE_ONLY_GENERAL_DISC]);
        }

        let shorts: Vec<u16, 3> = self
            .service_uuids
            .iter()
            .filter(|u| is_short_style(u) || ids::matches(u, &ids::from_short(short_value(u))))
            .map(short_value)
            .collect();
        if !shorts.is_empty() && out.len() + 2 + shorts.len() * 2 <= MAX_AD_PAYLOAD {
            let _ = out.push(1 + (shorts.len() * 2) as u8);
            let _ = out.push(AD_COMPLETE_16BIT_UUIDS);
            for s in &shorts {
                let _ = out.extend_from_slice(&s.to_le_bytes());
            }
        }

        if self.include_tx_power && out.len() + 3 <= MAX_AD_PAYLOAD {
            let _ = out.extend_from_slice(&[2, AD_TX_POWER, tx_power.dbm() as u8]);
        }

        if self.include_device_name && !device_name.is_empty() {
            let room = MAX_AD_PAYLOAD.saturating_sub(out.len() + 2);
            if room > 0 {
                let name = device_name.as_bytes();
                let (ad_type, len) = if name.len() <= room {
                    (AD_COMPLETE_LOCAL_NAME, name.len())
                } else {
                    (AD_SHORTENED_LOCAL_NAME, room)
                };
                let _ = out.push(1 + len as u8);
                let _ = out.push(ad_type);
                let _ = out.extend_from_slice(&name[..len]);
            }
        }

        out
    }
}

/// Everything a transport needs to start advertising.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub connectable: bool,
    /// 0 = advertise until stopped.
    pub timeout_ms: u32,
    pub tx_power: TxPowerLevel,
    pub mode: AdvertiseMode,
    pub device_name: String<DEVICE_INFO_MAX_LENGTH>,
    pub advertising_data: AdvertisingData,
    pub scan_response: AdvertisingData,
}

impl AdvertisingParams {
    /// HID peripheral advertisement for `device_name`.
    pub fn hid(device_name: &str) -> Self {
        let mut service_uuids = Vec::new();
        for uuid in [
            ids::DEVICE_INFORMATION_SERVICE,
            ids::HID_SERVICE,
            ids::BATTERY_SERVICE,
        ] {
            let _ = service_uuids.push(uuid);
        }

        let mut name = String::new();
        for ch in device_name.chars() {
            if name.push(ch).is_err() {
                break;
            }
        }

        Self {
            connectable: true,
            timeout_ms: 0,
            tx_power: TxPowerLevel::High,
            mode: AdvertiseMode::LowLatency,
            device_name: name,
            advertising_data: AdvertisingData {
                include_device_name: true,
                include_tx_power: false,
                service_uuids: service_uuids.clone(),
            },
            scan_response: AdvertisingData {
                include_device_name: false,
                include_tx_power: false,
                service_uuids,
            },
        }
    }

    /// Raw advertising payload (flags, service list, name).
    pub fn advertising_payload(&self) -> Vec<u8, MAX_AD_PAYLOAD> {
        self.advertising_data
            .encode(&self.device_name, self.tx_power, true)
    }

    /// Raw scan response payload.
    pub fn scan_response_payload(&self) -> Vec<u8, MAX_AD_PAYLOAD> {
        self.scan_response
            .encode(&self.device_name, self.tx_power, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hid_params_match_profile() {
        let params = AdvertisingParams::hid("BLE HID");
        assert!(params.connectable);
        assert_eq!(params.timeout_ms, 0);
        assert_eq!(params.tx_power, TxPowerLevel::High);
        assert_eq!(params.mode, AdvertiseMode::LowLatency);
        assert_eq!(
            params.advertising_data.service_uuids.as_slice(),
            &[
                ids::DEVICE_INFORMATION_SERVICE,
                ids::HID_SERVICE,
                ids::BATTERY_SERVICE
            ]
        );
        assert_eq!(
            params.advertising_data.service_uuids,
            params.scan_response.service_uuids
        );
        assert!(!params.advertising_data.include_tx_power);
    }

    #[test]
    fn advertising_payload_layout() {
        let params = AdvertisingParams::hid("Kbd");
        assert_eq!(
            params.advertising_payload().as_slice(),
            &[
                0x02, 0x01, 0x06, // Flags
                0x07, 0x03, 0x0A, 0x18, 0x12, 0x18, 0x0F, 0x18, // 16-bit services
                0x04, 0x09, b'K', b'b', b'd', // Complete name
            ]
        );
    }

    #[test]
    fn scan_response_has_services_only() {
        let params = AdvertisingParams::hid("Kbd");
        assert_eq!(
            params.scan_response_payload().as_slice(),
            &[0x07, 0x03, 0x0A, 0x18, 0x12, 0x18, 0x0F, 0x18]
        );
    }

    #[test]
    fn long_name_is_shortened_to_fit() {
        let params = AdvertisingParams::hid("ABCDEFGHIJKLMNOPQRST");
        let payload = params.advertising_payload();
        assert_eq!(payload.len(), MAX_AD_PAYLOAD);
        // 3 (flags) + 8 (services) leaves 18 name bytes after the header.
        assert_eq!(payload[11], 19);
        assert_eq!(payload[12], AD_SHORTENED_LOCAL_NAME);
        assert_eq!(&payload[13..], b"ABCDEFGHIJKLMNOPQR");
    }
}
