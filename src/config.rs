//! Peripheral-wide constants and runtime configuration.
//!
//! Protocol constants and defaults live here so they can be tuned in
//! one place. [`PeripheralConfig`] is the only runtime knob and is fixed
//! once the engine is constructed.

use embassy_time::Duration;

// Device information

/// Maximum UTF-8 length (bytes) of each Device Information string.
pub const DEVICE_INFO_MAX_LENGTH: usize = 20;

pub const DEFAULT_MANUFACTURER: &str = "rohit_s";
pub const DEFAULT_DEVICE_NAME: &str = "BLE HID";
pub const DEFAULT_SERIAL_NUMBER: &str = "12345678";

// HID service

/// HID Information value: bcdHID 1.11, country code 0,
/// flags RemoteWake | NormallyConnectable.
pub const HID_INFORMATION: [u8; 4] = [0x11, 0x01, 0x00, 0x03];

/// Battery level reported to every reader (percent).
pub const BATTERY_LEVEL_PERCENT: u8 = 100;

/// Client Characteristic Configuration value with notifications enabled.
pub const CCC_NOTIFICATIONS_ENABLED: [u8; 2] = [0x01, 0x00];

// Timing

/// Keyboard notification pump period (ms).
pub const KEYBOARD_NOTIFY_INTERVAL_MS: u64 = 20;

/// Mouse notification pump period (ms). Pointer motion wants a tighter loop.
pub const MOUSE_NOTIFY_INTERVAL_MS: u64 = 10;

/// Delay between bounded service-registration attempts (ms).
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;

/// Attempts made by [`RetryPolicy::bounded`] before giving up.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// How a failed service registration is retried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetryPolicy {
    /// Retry immediately until the transport accepts the service.
    #[default]
    Unbounded,
    /// Give up after `max_attempts`, waiting `backoff_ms` between tries.
    Bounded { max_attempts: u32, backoff_ms: u64 },
}

impl RetryPolicy {
    /// Bounded policy with the default attempt count and backoff.
    pub const fn bounded() -> Self {
        RetryPolicy::Bounded {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }

    /// Whether another attempt may follow `attempts` failed ones.
    pub fn should_retry(&self, attempts: u32) -> bool {
        match *self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded { max_attempts, .. } => attempts < max_attempts,
        }
    }

    /// Pause before the next attempt, if any.
    pub fn backoff(&self) -> Option<Duration> {
        match *self {
            RetryPolicy::Bounded { backoff_ms, .. } if backoff_ms > 0 => {
                Some(Duration::from_millis(backoff_ms))
            }
            _ => None,
        }
    }
}

/// Capabilities of the HID service and pump timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralConfig {
    /// Expose an Input Report characteristic (notify).
    pub need_input_report: bool,
    /// Expose an Output Report characteristic (host writes, e.g. LEDs).
    pub need_output_report: bool,
    /// Expose a Feature Report characteristic.
    pub need_feature_report: bool,
    /// Notification pump period in milliseconds.
    pub notify_interval_ms: u64,
    /// Service registration retry behaviour.
    pub retry: RetryPolicy,
}

impl PeripheralConfig {
    pub const KEYBOARD: Self = Self {
        need_input_report: true,
        need_output_report: true,
        need_feature_report: false,
        notify_interval_ms: KEYBOARD_NOTIFY_INTERVAL_MS,
        retry: RetryPolicy::Unbounded,
    };

    pub const MOUSE: Self = Self {
        need_input_report: true,
        need_output_report: false,
        need_feature_report: false,
        notify_interval_ms: MOUSE_NOTIFY_INTERVAL_MS,
        retry: RetryPolicy::Unbounded,
    };

    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }
}
