//! GATT request dispatcher.
//!
//! Computes the reply to every host read and write. Reads are answered by
//! UUID; Report Reference descriptors are disambiguated by the exact
//! property mask of the owning Report characteristic:
//!
//! | owner properties              | reply          |
//! |-------------------------------|----------------|
//! | READ \| WRITE \| NOTIFY       | `[0, 1]` input |
//! | READ \| WRITE \| WRITE_NO_RSP | `[0, 2]` output|
//! | READ or WRITE alone           | `[0, 3]` feature|
//! | anything else                 | failure        |
//!
//! Writes are refused with `WriteNotPermitted` unless the characteristic
//! declares WRITE or WRITE_NO_RESPONSE (descriptors: a write permission).
//! The Report Map is always served from the profile's descriptor bytes,
//! never from the stored attribute value.
//!
//! The engine runs these on its serialized executor and owns sending the
//! replies; nothing here touches the transport.

use alloc::vec;
use alloc::vec::Vec;

use super::device_info::DeviceInfo;
use super::gatt::{Attribute, Characteristic, Descriptor, GattDatabase, Properties};
use super::transport::{GattStatus, ReadRequest, WriteRequest};
use super::uuid::{self as ids, matches};
use crate::config::{BATTERY_LEVEL_PERCENT, HID_INFORMATION};

/// Report Reference report types.
pub const REPORT_TYPE_INPUT: u8 = 1;
pub const REPORT_TYPE_OUTPUT: u8 = 2;
pub const REPORT_TYPE_FEATURE: u8 = 3;

/// Status, offset and payload of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: GattStatus,
    pub offset: u16,
    pub value: Vec<u8>,
}

impl Reply {
    pub fn success(value: Vec<u8>) -> Self {
        Self {
            status: GattStatus::Success,
            offset: 0,
            value,
        }
    }

    pub fn empty() -> Self {
        Self::success(Vec::new())
    }

    pub fn error(status: GattStatus) -> Self {
        Self {
            status,
            offset: 0,
            value: Vec::new(),
        }
    }
}

/// Result of dispatching a write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Reply to send, if the host asked for one.
    pub reply: Option<Reply>,
    /// Raw bytes for the profile's output-report hook.
    pub output_report: Option<Vec<u8>>,
}

/// `[report_id, report_type]` for a Report Reference descriptor owned by
/// a characteristic with `properties`.
pub fn report_reference(properties: Properties) -> Option<[u8; 2]> {
    let input = Properties::READ | Properties::WRITE | Properties::NOTIFY;
    let output = Properties::READ | Properties::WRITE | Properties::WRITE_NO_RESPONSE;
    let report_type = if properties == input {
        REPORT_TYPE_INPUT
    } else if properties == output {
        REPORT_TYPE_OUTPUT
    } else if properties == Properties::READ || properties == Properties::WRITE {
        REPORT_TYPE_FEATURE
    } else {
        return None;
    };
    Some([0, report_type])
}

/// Slice of the report map starting at `offset`.
///
/// An offset at or past the end yields an empty, successful reply.
pub fn read_report_map(report_map: &[u8], offset: u16) -> Reply {
    if offset == 0 {
        return Reply::success(report_map.to_vec());
    }
    let offset_usize = offset as usize;
    let value = if report_map.len() > offset_usize {
        report_map[offset_usize..].to_vec()
    } else {
        Vec::new()
    };
    Reply {
        status: GattStatus::Success,
        offset,
        value,
    }
}

pub fn read_characteristic(
    characteristic: &Characteristic,
    offset: u16,
    info: &DeviceInfo,
    report_map: &[u8],
) -> Reply {
    let uuid = &characteristic.uuid;
    if matches(uuid, &ids::HID_INFORMATION) {
        Reply::success(HID_INFORMATION.to_vec())
    } else if matches(uuid, &ids::REPORT_MAP) {
        read_report_map(report_map, offset)
    } else if matches(uuid, &ids::HID_CONTROL_POINT) {
        Reply::success(vec![0])
    } else if matches(uuid, &ids::REPORT) {
        Reply::empty()
    } else if matches(uuid, &ids::MANUFACTURER_NAME) {
        Reply::success(info.manufacturer.as_bytes().to_vec())
    } else if matches(uuid, &ids::SERIAL_NUMBER) {
        Reply::success(info.serial_number.as_bytes().to_vec())
    } else if matches(uuid, &ids::MODEL_NUMBER) {
        Reply::success(info.device_name.as_bytes().to_vec())
    } else if matches(uuid, &ids::BATTERY_LEVEL) {
        Reply::success(vec![BATTERY_LEVEL_PERCENT])
    } else {
        Reply::success(characteristic.value.clone())
    }
}

pub fn read_descriptor(owner: &Characteristic, descriptor: &Descriptor) -> Reply {
    if matches(&descriptor.uuid, &ids::REPORT_REFERENCE) {
        match report_reference(owner.properties) {
            Some(reference) => Reply::success(reference.to_vec()),
            None => Reply::error(GattStatus::Failure),
        }
    } else {
        Reply::success(descriptor.value.clone())
    }
}

/// Answer a read of a characteristic (`descriptor == false`) or a
/// descriptor. A handle of the wrong kind is treated as unknown.
pub fn dispatch_read(
    db: &GattDatabase,
    info: &DeviceInfo,
    report_map: &[u8],
    request: &ReadRequest,
    descriptor: bool,
) -> Reply {
    match (db.attribute(request.handle), descriptor) {
        (Some(Attribute::Characteristic(c)), false) => {
            read_characteristic(c, request.offset, info, report_map)
        }
        (Some(Attribute::Descriptor { owner, descriptor }), true) => read_descriptor(owner, descriptor),
        _ => Reply::error(GattStatus::InvalidHandle),
    }
}

/// Apply a write to the database.
///
/// Writes to a Report characteristic are handed to the output-report hook
/// untouched; every other writable attribute stores the bytes (at
/// `offset`). Read-only attributes are left alone.
pub fn dispatch_write(db: &mut GattDatabase, request: &WriteRequest, descriptor: bool) -> WriteOutcome {
    let respond = |reply: Reply| request.response_needed.then_some(reply);
    let refused = |status: GattStatus| WriteOutcome {
        reply: respond(Reply::error(status)),
        output_report: None,
    };

    let current = match (db.attribute(request.handle), descriptor) {
        (Some(Attribute::Characteristic(c)), false) => {
            if !c.is_writable() {
                return refused(GattStatus::WriteNotPermitted);
            }
            if matches(&c.uuid, &ids::REPORT) {
                return WriteOutcome {
                    reply: respond(Reply::empty()),
                    output_report: Some(request.value.clone()),
                };
            }
            c.value.clone()
        }
        (Some(Attribute::Descriptor { descriptor: d, .. }), true) => {
            if !d.is_writable() {
                return refused(GattStatus::WriteNotPermitted);
            }
            d.value.clone()
        }
        _ => return refused(GattStatus::InvalidHandle),
    };

    let offset = request.offset as usize;
    if offset > current.len() {
        return refused(GattStatus::InvalidOffset);
    }
    let mut value = current;
    value.truncate(offset);
    value.extend_from_slice(&request.value);
    if !db.set_value(request.handle, &value) {
        return refused(GattStatus::InvalidHandle);
    }

    WriteOutcome {
        reply: respond(Reply::empty()),
        output_report: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::gatt::AttributeHandle;
    use crate::ble::DeviceAddress;
    use crate::config::PeripheralConfig;
    use crate::hid::mouse::MOUSE_REPORT_MAP;

    const HOST: DeviceAddress = DeviceAddress([9, 9, 9, 9, 9, 9]);

    fn read(handle: AttributeHandle, offset: u16) -> ReadRequest {
        ReadRequest {
            device: HOST,
            request_id: 7,
            offset,
            handle,
        }
    }

    fn write(handle: AttributeHandle, value: &[u8], response_needed: bool) -> WriteRequest {
        WriteRequest {
            device: HOST,
            request_id: 8,
            handle,
            prepared: false,
            response_needed,
            offset: 0,
            value: value.to_vec(),
        }
    }

    fn handle_of(db: &GattDatabase, uuid: &uuid::Uuid) -> AttributeHandle {
        db.services()
            .iter()
            .find_map(|s| s.characteristic(uuid))
            .map(|c| c.handle)
            .unwrap()
    }

    fn full_db() -> GattDatabase {
        let config = PeripheralConfig {
            need_feature_report: true,
            ..PeripheralConfig::KEYBOARD
        };
        GattDatabase::build(&config, MOUSE_REPORT_MAP)
    }

    #[test]
    fn report_reference_by_exact_mask() {
        let r = Properties::READ;
        let w = Properties::WRITE;
        assert_eq!(report_reference(r | w | Properties::NOTIFY), Some([0, 1]));
        assert_eq!(
            report_reference(r | w | Properties::WRITE_NO_RESPONSE),
            Some([0, 2])
        );
        assert_eq!(report_reference(r), Some([0, 3]));
        assert_eq!(report_reference(w), Some([0, 3]));
        assert_eq!(report_reference(r | w), None);
        assert_eq!(report_reference(r | Properties::NOTIFY), None);
        assert_eq!(
            report_reference(r | w | Properties::NOTIFY | Properties::INDICATE),
            None
        );
    }

    #[test]
    fn report_map_offsets() {
        let map = [1u8, 2, 3, 4, 5];
        assert_eq!(read_report_map(&map, 0).value, map);

        let tail = read_report_map(&map, 3);
        assert_eq!(tail.status, GattStatus::Success);
        assert_eq!(tail.offset, 3);
        assert_eq!(tail.value, [4, 5]);

        for offset in [5, 6, 200] {
            let past = read_report_map(&map, offset);
            assert_eq!(past.status, GattStatus::Success);
            assert!(past.value.is_empty());
        }
    }

    #[test]
    fn fixed_characteristic_reads() {
        let db = full_db();
        let info = DeviceInfo::default();
        let reply = |uuid| {
            dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(handle_of(&db, &uuid), 0), false)
        };

        assert_eq!(reply(ids::HID_INFORMATION).value, [0x11, 0x01, 0x00, 0x03]);
        assert_eq!(reply(ids::REPORT_MAP).value, MOUSE_REPORT_MAP);
        assert_eq!(reply(ids::HID_CONTROL_POINT).value, [0]);
        assert!(reply(ids::REPORT).value.is_empty());
        assert_eq!(reply(ids::MANUFACTURER_NAME).value, b"rohit_s");
        assert_eq!(reply(ids::MODEL_NUMBER).value, b"BLE HID");
        assert_eq!(reply(ids::SERIAL_NUMBER).value, b"12345678");
        assert_eq!(reply(ids::BATTERY_LEVEL).value, [100]);
    }

    #[test]
    fn unknown_characteristic_echoes_value() {
        let mut db = full_db();
        let protocol_mode = handle_of(&db, &ids::PROTOCOL_MODE);
        db.set_value(protocol_mode, &[0x01]);
        let info = DeviceInfo::default();
        let reply = dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(protocol_mode, 0), false);
        assert_eq!(reply, Reply::success(vec![0x01]));
    }

    #[test]
    fn report_reference_reads() {
        let db = full_db();
        let info = DeviceInfo::default();
        let reference = |owner: Option<AttributeHandle>, index: u16| {
            let handle = AttributeHandle(owner.unwrap().0 + index);
            dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(handle, 0), true)
        };

        // Input report: CCC at +1, Report Reference at +2.
        assert_eq!(reference(db.input_report(), 2).value, [0, 1]);
        assert_eq!(reference(db.output_report(), 1).value, [0, 2]);
        // Feature report is READ | WRITE, which has no exact match.
        assert_eq!(reference(db.feature_report(), 1).status, GattStatus::Failure);

        let ccc = reference(db.input_report(), 1);
        assert_eq!(ccc, Reply::success(vec![0x01, 0x00]));
    }

    #[test]
    fn wrong_kind_or_unknown_handle_is_invalid() {
        let db = full_db();
        let info = DeviceInfo::default();
        let input = db.input_report().unwrap();
        assert_eq!(
            dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(input, 0), true).status,
            GattStatus::InvalidHandle
        );
        assert_eq!(
            dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(AttributeHandle(0x7777), 0), false)
                .status,
            GattStatus::InvalidHandle
        );
    }

    #[test]
    fn report_write_goes_to_output_hook() {
        let mut db = full_db();
        let output = db.output_report().unwrap();

        let outcome = dispatch_write(&mut db, &write(output, &[0x02], true), false);
        assert_eq!(outcome.output_report, Some(vec![0x02]));
        assert_eq!(outcome.reply, Some(Reply::empty()));

        let silent = dispatch_write(&mut db, &write(output, &[0x00], false), false);
        assert_eq!(silent.output_report, Some(vec![0x00]));
        assert!(silent.reply.is_none());
    }

    #[test]
    fn ccc_write_stores_value() {
        let mut db = full_db();
        let ccc = AttributeHandle(db.input_report().unwrap().0 + 1);

        let outcome = dispatch_write(&mut db, &write(ccc, &[0x00, 0x00], true), true);
        assert_eq!(outcome.reply, Some(Reply::empty()));
        assert!(outcome.output_report.is_none());

        let info = DeviceInfo::default();
        let reply = dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(ccc, 0), true);
        assert_eq!(reply.value, [0x00, 0x00]);
    }

    #[test]
    fn protocol_mode_write_without_response() {
        let mut db = full_db();
        let mode = handle_of(&db, &ids::PROTOCOL_MODE);
        let outcome = dispatch_write(&mut db, &write(mode, &[0x00], false), false);
        assert!(outcome.reply.is_none());
        let Some(Attribute::Characteristic(c)) = db.attribute(mode) else {
            panic!("protocol mode missing");
        };
        assert_eq!(c.value, [0x00]);
    }

    #[test]
    fn write_past_end_is_invalid_offset() {
        let mut db = full_db();
        let mode = handle_of(&db, &ids::PROTOCOL_MODE);
        let mut request = write(mode, &[0x01], true);
        request.offset = 4;
        let outcome = dispatch_write(&mut db, &request, false);
        assert_eq!(outcome.reply.unwrap().status, GattStatus::InvalidOffset);
    }

    #[test]
    fn write_to_unknown_handle() {
        let mut db = full_db();
        let outcome = dispatch_write(&mut db, &write(AttributeHandle(0x7777), &[1], true), true);
        assert_eq!(outcome.reply.unwrap().status, GattStatus::InvalidHandle);
    }

    #[test]
    fn read_only_characteristics_refuse_writes() {
        let mut db = full_db();
        let info = DeviceInfo::default();
        for uuid in [ids::REPORT_MAP, ids::HID_INFORMATION, ids::MODEL_NUMBER, ids::BATTERY_LEVEL] {
            let handle = handle_of(&db, &uuid);
            let outcome = dispatch_write(&mut db, &write(handle, &[0xDE, 0xAD], true), false);
            assert_eq!(
                outcome.reply.map(|r| r.status),
                Some(GattStatus::WriteNotPermitted),
                "{uuid}"
            );
            assert!(outcome.output_report.is_none());
        }

        let map = handle_of(&db, &ids::REPORT_MAP);
        let reply = dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(map, 0), false);
        assert_eq!(reply.value, MOUSE_REPORT_MAP);
        let hid_info = handle_of(&db, &ids::HID_INFORMATION);
        let reply = dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(hid_info, 0), false);
        assert_eq!(reply.value, HID_INFORMATION);
    }

    #[test]
    fn report_map_served_from_profile_bytes() {
        let mut db = full_db();
        let map = handle_of(&db, &ids::REPORT_MAP);
        db.set_value(map, &[0xDE, 0xAD]);
        let info = DeviceInfo::default();
        let reply = dispatch_read(&db, &info, MOUSE_REPORT_MAP, &read(map, 0), false);
        assert_eq!(reply.value, MOUSE_REPORT_MAP);
    }

    #[test]
    fn refused_write_without_response_is_silent() {
        let mut db = full_db();
        let map = handle_of(&db, &ids::REPORT_MAP);
        let outcome = dispatch_write(&mut db, &write(map, &[1], false), false);
        assert!(outcome.reply.is_none());
    }
}
