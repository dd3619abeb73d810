//! HID profiles: report encoders, report maps and the outbound queue.

pub mod descriptor;
pub mod keyboard;
pub mod mouse;
pub mod report_queue;


use crate::config::PeripheralConfig;

pub use keyboard::{Keyboard, KeyboardLeds, KeyboardReport};
pub use mouse::{Mouse, MouseReport};
pub use report_queue::ReportQueue;

/// A device personality served over the HID service.
///
/// The profile supplies the fixed report map and receives host writes to
/// the Output Report characteristic. Hooks run on the engine's executor,
/// outside any engine lock.
pub trait HidProfile {
    /// Configuration the profile is normally served with.
    const CONFIG: PeripheralConfig;

    /// HID Report Descriptor, served byte-for-byte from the Report Map.
    fn report_map(&self) -> &'static [u8];

    /// Host wrote the Output Report characteristic.
    fn on_output_report(&self, report: &[u8]);
}
