//! HID Report Descriptor walker.
//!
//! Computes the size of the input, output and feature reports a report
//! map declares, and which Generic Desktop application it describes. The
//! engine uses this to sanity-check queued reports and the configured
//! Report characteristics against the profile's map.
//!
//! ## Item encoding
//!
//! Each short item starts with a prefix byte `tag(4) | type(2) | size(2)`,
//! where size code 3 means 4 data bytes. Types: 0 = Main, 1 = Global,
//! 2 = Local. The interesting items:
//! - Global Report Size (0x75) / Report Count (0x95): field geometry
//! - Global Report ID (0x85): reports are prefixed with an ID byte
//! - Main Input (0x81) / Output (0x91) / Feature (0xB1): emit fields
//!
//! ## Limitations
//!
//! - Push/Pop state is not supported
//! - Long items are skipped
//! - With several report IDs, sizes are summed across all of them

use log::debug;

/// Usage page codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsagePage {
    GenericDesktop,
    Keyboard,
    Led,
    Button,
    Consumer,
    Unknown(u16),
}

impl From<u16> for UsagePage {
    fn from(code: u16) -> Self {
        match code {
            0x01 => UsagePage::GenericDesktop,
            0x07 => UsagePage::Keyboard,
            0x08 => UsagePage::Led,
            0x09 => UsagePage::Button,
            0x0C => UsagePage::Consumer,
            other => UsagePage::Unknown(other),
        }
    }
}

/// Generic Desktop application usages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Application {
    Pointer,
    Mouse,
    Keyboard,
    Other(u16),
}

impl From<u16> for Application {
    fn from(code: u16) -> Self {
        match code {
            0x01 => Application::Pointer,
            0x02 => Application::Mouse,
            0x06 => Application::Keyboard,
            other => Application::Other(other),
        }
    }
}

/// Report sizes declared by a report map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportLayout {
    pub input_bits: u32,
    pub output_bits: u32,
    pub feature_bits: u32,
    pub uses_report_ids: bool,
    /// Usage of the first Generic Desktop application collection.
    pub application: Option<Application>,
}

impl ReportLayout {
    /// Walk a report map. Returns `None` if an item runs past the end.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut layout = ReportLayout::default();

        let mut usage_page = UsagePage::Unknown(0);
        let mut usage: u16 = 0;
        let mut report_size: u32 = 0;
        let mut report_count: u32 = 0;

        let mut i = 0;
        while i < data.len() {
            let prefix = data[i];

            // Long item: 0xFE, size, long tag, data.
            if prefix == 0xFE {
                let size = *data.get(i + 1)? as usize;
                i += 3 + size;
                continue;
            }

            let tag = prefix >> 4;
            let item_type = (prefix >> 2) & 0x03;
            let size = match prefix & 0x03 {
                3 => 4,
                n => n as usize,
            };
            let bytes = data.get(i + 1..i + 1 + size)?;
            let value = bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32);

            match (item_type, tag) {
                // Main
                (0, 0x8) => add_field(&mut layout.input_bits, report_size, report_count),
                (0, 0x9) => add_field(&mut layout.output_bits, report_size, report_count),
                (0, 0xB) => add_field(&mut layout.feature_bits, report_size, report_count),
                (0, 0xA) => {
                    // Collection (Application)
                    if value == 0x01
                        && usage_page == UsagePage::GenericDesktop
                        && layout.application.is_none()
                    {
                        layout.application = Some(Application::from(usage));
                    }
                }
                // Global
                (1, 0x0) => usage_page = UsagePage::from(value as u16),
                (1, 0x7) => report_size = value,
                (1, 0x8) => layout.uses_report_ids = true,
                (1, 0x9) => report_count = value,
                // Local
                (2, 0x0) => usage = value as u16,
                _ => {}
            }

            i += 1 + size;
        }

        debug!("report map layout: {:?}", layout);
        Some(layout)
    }

    /// Input report length in bytes, including the report ID byte.
    pub fn input_len(&self) -> usize {
        Self::bytes(self.input_bits, self.uses_report_ids)
    }

    pub fn output_len(&self) -> usize {
        Self::bytes(self.output_bits, self.uses_report_ids)
    }

    pub fn feature_len(&self) -> usize {
        Self::bytes(self.feature_bits, self.uses_report_ids)
    }

    fn bytes(bits: u32, report_id: bool) -> usize {
        if bits == 0 {
            return 0;
        }
        (bits.div_ceil(8) as usize).saturating_add(usize::from(report_id))
    }
}

/// Absurd 4-byte sizes/counts saturate instead of overflowing.
fn add_field(total: &mut u32, report_size: u32, report_count: u32) {
    *total = total.saturating_add(report_size.saturating_mul(report_count));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::keyboard::KEYBOARD_REPORT_MAP;
    use crate::hid::mouse::MOUSE_REPORT_MAP;

    #[test]
    fn keyboard_map_layout() {
        let layout = ReportLayout::parse(KEYBOARD_REPORT_MAP).unwrap();
        assert_eq!(layout.application, Some(Application::Keyboard));
        assert_eq!(layout.input_len(), 8);
        assert_eq!(layout.output_len(), 1);
        assert_eq!(layout.feature_len(), 0);
        assert!(!layout.uses_report_ids);
    }

    #[test]
    fn mouse_map_layout() {
        let layout = ReportLayout::parse(MOUSE_REPORT_MAP).unwrap();
        assert_eq!(layout.application, Some(Application::Mouse));
        assert_eq!(layout.input_len(), 4);
        assert_eq!(layout.output_len(), 0);
    }

    #[test]
    fn report_id_adds_prefix_byte() {
        let map = [
            0x05, 0x0C, // Usage Page (Consumer)
            0x09, 0x01, // Usage (Consumer Control)
            0xA1, 0x01, // Collection (Application)
            0x85, 0x03, //   Report ID (3)
            0x75, 0x10, //   Report Size (16)
            0x95, 0x01, //   Report Count (1)
            0x81, 0x00, //   Input (Data, Array)
            0xC0, // End Collection
        ];
        let layout = ReportLayout::parse(&map).unwrap();
        assert!(layout.uses_report_ids);
        assert_eq!(layout.input_len(), 3);
        assert_eq!(layout.application, None);
    }

    #[test]
    fn two_byte_values_are_little_endian() {
        let map = [
            0x75, 0x01, // Report Size (1)
            0x96, 0x10, 0x01, // Report Count (272)
            0xB1, 0x02, // Feature
        ];
        let layout = ReportLayout::parse(&map).unwrap();
        assert_eq!(layout.feature_bits, 272);
        assert_eq!(layout.feature_len(), 34);
    }

    #[test]
    fn truncated_item_fails() {
        assert!(ReportLayout::parse(&[0x05]).is_none());
        assert!(ReportLayout::parse(&[0x96, 0x10]).is_none());
        assert_eq!(ReportLayout::parse(&[]), Some(ReportLayout::default()));
    }

    #[test]
    fn oversized_fields_saturate() {
        let map = [
            0x77, 0xFF, 0xFF, 0xFF, 0xFF, // Report Size (u32::MAX)
            0x97, 0xFF, 0xFF, 0xFF, 0xFF, // Report Count (u32::MAX)
            0x81, 0x02, // Input
            0x81, 0x02, // Input
        ];
        let layout = ReportLayout::parse(&map).unwrap();
        assert_eq!(layout.input_bits, u32::MAX);
        assert_eq!(layout.input_len(), (u32::MAX.div_ceil(8)) as usize);
    }
}
