//! Set of connected, bonded hosts.
//!
//! A host is present iff it is connected **and** bonded. The notification
//! pump fans out to whatever is in here at the moment it runs, so a host
//! that disconnects disappears before the next report goes out.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::DeviceAddress;

pub struct DeviceRegistry {
    devices: Mutex<CriticalSectionRawMutex, RefCell<BTreeSet<DeviceAddress>>>,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            devices: Mutex::new(RefCell::new(BTreeSet::new())),
        }
    }

    /// Returns `true` if the device was not already registered.
    pub fn insert(&self, device: DeviceAddress) -> bool {
        self.devices.lock(|d| d.borrow_mut().insert(device))
    }

    /// Returns `true` if the device was registered.
    pub fn remove(&self, device: &DeviceAddress) -> bool {
        self.devices.lock(|d| d.borrow_mut().remove(device))
    }

    pub fn contains(&self, device: &DeviceAddress) -> bool {
        self.devices.lock(|d| d.borrow().contains(device))
    }

    /// Copy of the current membership, taken under the lock.
    pub fn snapshot(&self) -> Vec<DeviceAddress> {
        self.devices.lock(|d| d.borrow().iter().copied().collect())
    }

    /// Remove and return every registered device.
    pub fn drain(&self) -> Vec<DeviceAddress> {
        self.devices
            .lock(|d| core::mem::take(&mut *d.borrow_mut()).into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.devices.lock(|d| d.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_A: DeviceAddress = DeviceAddress([1, 2, 3, 4, 5, 6]);
    const HOST_B: DeviceAddress = DeviceAddress([6, 5, 4, 3, 2, 1]);

    #[test]
    fn insert_is_idempotent() {
        let registry = DeviceRegistry::new();
        assert!(registry.insert(HOST_A));
        assert!(!registry.insert(HOST_A));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&HOST_A));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let registry = DeviceRegistry::new();
        registry.insert(HOST_A);
        assert!(!registry.remove(&HOST_B));
        assert!(registry.remove(&HOST_A));
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties_registry() {
        let registry = DeviceRegistry::new();
        registry.insert(HOST_B);
        registry.insert(HOST_A);
        assert_eq!(registry.drain(), [HOST_A, HOST_B]);
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }
}
