//! Connection and bonding state machine.
//!
//! Pure bookkeeping: the machine consumes link and bond events and returns
//! the [`ConnectionAction`]s the engine must carry out on the transport.
//!
//! ```text
//!             connected, unbonded              bonded
//! DISCONNECTED ──────────────────► BONDING ─────────────► CONNECTED
//!      ▲  │      connected, bonded                            │
//!      │  └───────────────────────────────────────────────────┤
//!      └───────────────────── disconnected (any state) ◄──────┘
//! ```
//!
//! Every disconnect re-arms a persistent connect request so the link comes
//! back without caller intervention.

use alloc::collections::{BTreeMap, BTreeSet};

use heapless::Vec;
use log::debug;

use super::transport::{BondState, LinkState};
use super::DeviceAddress;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Bonding,
    Connected,
}

/// Transport work requested by a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionAction {
    /// Confirm pairing and start bond creation.
    BeginBonding(DeviceAddress),
    /// Persistent (auto) connect request.
    Connect(DeviceAddress),
    /// Add to the device registry.
    Register(DeviceAddress),
    /// Remove from the device registry.
    Unregister(DeviceAddress),
}

/// Outcome of an event that changed a device's state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub device: DeviceAddress,
    pub state: ConnectionState,
    pub actions: Vec<ConnectionAction, 2>,
}

impl Transition {
    fn new(device: DeviceAddress, state: ConnectionState, actions: &[ConnectionAction]) -> Self {
        Self {
            device,
            state,
            // At most two actions per transition.
            actions: Vec::from_slice(actions).unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub struct ConnectionMachine {
    states: BTreeMap<DeviceAddress, ConnectionState>,
    /// Devices waiting for a bond-state-changed event.
    bond_waiters: BTreeSet<DeviceAddress>,
}

impl ConnectionMachine {
    pub const fn new() -> Self {
        Self {
            states: BTreeMap::new(),
            bond_waiters: BTreeSet::new(),
        }
    }

    pub fn state(&self, device: &DeviceAddress) -> ConnectionState {
        self.states.get(device).copied().unwrap_or_default()
    }

    pub fn is_waiting_for_bond(&self, device: &DeviceAddress) -> bool {
        self.bond_waiters.contains(device)
    }

    /// Handle a raw link event. Transitional link states are ignored.
    pub fn on_link_event(
        &mut self,
        device: DeviceAddress,
        link: LinkState,
        bond: BondState,
    ) -> Option<Transition> {
        let transition = match (link, bond) {
            (LinkState::Connected, BondState::None) => {
                self.bond_waiters.insert(device);
                debug!("{} unbonded, waiting for bond", device);
                Transition::new(
                    device,
                    ConnectionState::Bonding,
                    &[ConnectionAction::BeginBonding(device)],
                )
            }
            // Bond already in flight: wait for it without starting another.
            (LinkState::Connected, BondState::Bonding) => {
                self.bond_waiters.insert(device);
                debug!("{} already bonding, waiting", device);
                Transition::new(device, ConnectionState::Bonding, &[])
            }
            (LinkState::Connected, BondState::Bonded) => Transition::new(
                device,
                ConnectionState::Connected,
                &[
                    ConnectionAction::Connect(device),
                    ConnectionAction::Register(device),
                ],
            ),
            (LinkState::Disconnected, _) => Transition::new(
                device,
                ConnectionState::Disconnected,
                &[
                    ConnectionAction::Unregister(device),
                    ConnectionAction::Connect(device),
                ],
            ),
            (LinkState::Connecting | LinkState::Disconnecting, _) => return None,
        };
        self.record(device, transition.state);
        Some(transition)
    }

    /// Handle a bond-state-changed event. Only `Bonded` for a device with
    /// an armed waiter produces a transition; the waiter then disarms.
    pub fn on_bond_event(&mut self, device: DeviceAddress, bond: BondState) -> Option<Transition> {
        if bond != BondState::Bonded || !self.bond_waiters.remove(&device) {
            return None;
        }
        debug!("bond waiter for {} fired", device);
        let transition = if self.state(&device) == ConnectionState::Bonding {
            Transition::new(
                device,
                ConnectionState::Connected,
                &[
                    ConnectionAction::Connect(device),
                    ConnectionAction::Register(device),
                ],
            )
        } else {
            // Link dropped while bonding; the connected event will register it.
            Transition::new(
                device,
                self.state(&device),
                &[ConnectionAction::Connect(device)],
            )
        };
        self.record(device, transition.state);
        Some(transition)
    }

    /// Number of devices in a non-default state.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    // Disconnected is the default, so it is not stored.
    fn record(&mut self, device: DeviceAddress, state: ConnectionState) {
        if state == ConnectionState::Disconnected {
            self.states.remove(&device);
        } else {
            self.states.insert(device, state);
        }
    }

    /// Forget every device and waiter.
    pub fn reset(&mut self) {
        self.states.clear();
        self.bond_waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionAction::*;
    use super::*;

    const HOST: DeviceAddress = DeviceAddress([0xC0, 0xFF, 0xEE, 0, 0, 1]);

    #[test]
    fn unbonded_connect_starts_bonding() {
        let mut machine = ConnectionMachine::new();
        let t = machine
            .on_link_event(HOST, LinkState::Connected, BondState::None)
            .unwrap();
        assert_eq!(t.state, ConnectionState::Bonding);
        assert_eq!(t.actions.as_slice(), &[BeginBonding(HOST)]);
        assert!(machine.is_waiting_for_bond(&HOST));
    }

    #[test]
    fn bond_completion_connects_and_registers() {
        let mut machine = ConnectionMachine::new();
        machine.on_link_event(HOST, LinkState::Connected, BondState::None);
        let t = machine.on_bond_event(HOST, BondState::Bonded).unwrap();
        assert_eq!(t.state, ConnectionState::Connected);
        assert_eq!(t.actions.as_slice(), &[Connect(HOST), Register(HOST)]);
        assert!(!machine.is_waiting_for_bond(&HOST));
        assert_eq!(machine.state(&HOST), ConnectionState::Connected);
    }

    #[test]
    fn waiter_ignores_intermediate_bond_states() {
        let mut machine = ConnectionMachine::new();
        machine.on_link_event(HOST, LinkState::Connected, BondState::None);
        assert!(machine.on_bond_event(HOST, BondState::Bonding).is_none());
        assert!(machine.on_bond_event(HOST, BondState::None).is_none());
        assert!(machine.is_waiting_for_bond(&HOST));
    }

    #[test]
    fn bond_event_without_waiter_is_ignored() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.on_bond_event(HOST, BondState::Bonded).is_none());
        assert_eq!(machine.state(&HOST), ConnectionState::Disconnected);
    }

    #[test]
    fn bond_in_progress_does_not_restart_bonding() {
        let mut machine = ConnectionMachine::new();
        let t = machine
            .on_link_event(HOST, LinkState::Connected, BondState::Bonding)
            .unwrap();
        assert_eq!(t.state, ConnectionState::Bonding);
        assert!(t.actions.is_empty());
        assert!(machine.is_waiting_for_bond(&HOST));
    }

    #[test]
    fn bonded_connect_registers_immediately() {
        let mut machine = ConnectionMachine::new();
        let t = machine
            .on_link_event(HOST, LinkState::Connected, BondState::Bonded)
            .unwrap();
        assert_eq!(t.state, ConnectionState::Connected);
        assert_eq!(t.actions.as_slice(), &[Connect(HOST), Register(HOST)]);
    }

    #[test]
    fn disconnect_unregisters_and_reconnects() {
        let mut machine = ConnectionMachine::new();
        machine.on_link_event(HOST, LinkState::Connected, BondState::Bonded);
        let t = machine
            .on_link_event(HOST, LinkState::Disconnected, BondState::Bonded)
            .unwrap();
        assert_eq!(t.state, ConnectionState::Disconnected);
        assert_eq!(t.actions.as_slice(), &[Unregister(HOST), Connect(HOST)]);
    }

    #[test]
    fn bond_after_disconnect_only_reconnects() {
        let mut machine = ConnectionMachine::new();
        machine.on_link_event(HOST, LinkState::Connected, BondState::None);
        machine.on_link_event(HOST, LinkState::Disconnected, BondState::Bonding);
        let t = machine.on_bond_event(HOST, BondState::Bonded).unwrap();
        assert_eq!(t.state, ConnectionState::Disconnected);
        assert_eq!(t.actions.as_slice(), &[Connect(HOST)]);
        assert_eq!(machine.tracked(), 0);
    }

    #[test]
    fn transitional_link_states_ignored() {
        let mut machine = ConnectionMachine::new();
        assert!(machine
            .on_link_event(HOST, LinkState::Connecting, BondState::None)
            .is_none());
        assert!(machine
            .on_link_event(HOST, LinkState::Disconnecting, BondState::Bonded)
            .is_none());
    }

    #[test]
    fn reset_clears_waiters() {
        let mut machine = ConnectionMachine::new();
        machine.on_link_event(HOST, LinkState::Connected, BondState::None);
        machine.reset();
        assert!(!machine.is_waiting_for_bond(&HOST));
        assert!(machine.on_bond_event(HOST, BondState::Bonded).is_none());
    }

    #[test]
    fn disconnected_devices_are_not_retained() {
        let mut machine = ConnectionMachine::new();
        for last in 0..16u8 {
            let device = DeviceAddress([1, 2, 3, 4, 5, last]);
            machine.on_link_event(device, LinkState::Connected, BondState::Bonded);
            machine.on_link_event(device, LinkState::Disconnected, BondState::Bonded);
        }
        assert_eq!(machine.tracked(), 0);

        machine.on_link_event(HOST, LinkState::Connected, BondState::Bonded);
        assert_eq!(machine.tracked(), 1);
        assert_eq!(machine.state(&HOST), ConnectionState::Connected);
    }
}
