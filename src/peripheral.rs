//! HID peripheral engine.
//!
//! [`HidPeripheral`] ties the pieces together:
//!
//! - a serialized **executor**: every transport call (service adds,
//!   advertising, connects, notifications, responses) is queued as a
//!   [`TransportOp`] and issued one at a time, so replies to different
//!   requests never interleave on the wire;
//! - the **notification pump**: every `notify_interval_ms` it moves at
//!   most one queued input report to the executor, which fans it out to
//!   every registered host;
//! - the **connection state machine** and **device registry**.
//!
//! Transport callbacks enter through [`HidPeripheral::handle_event`] and
//! are processed on the executor like everything else. Drive the engine
//! with [`HidPeripheral::run`]; [`HidPeripheral::shutdown`] ends it.
//!
//! ```text
//!  encoders ──► ReportQueue ──► pump ──┐
//!  handle_event ──────────────────────►├──► ops ──► executor ──► transport
//!  start/stop_advertising ────────────►┘
//! ```

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_futures::select::{select3, Either3};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Ticker, Timer};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::advertising::AdvertisingParams;
use crate::ble::connection::{ConnectionAction, ConnectionMachine, ConnectionState, Transition};
use crate::ble::device_info::DeviceInfo;
use crate::ble::dispatcher::{dispatch_read, dispatch_write, Reply};
use crate::ble::gatt::GattDatabase;
use crate::ble::registry::DeviceRegistry;
use crate::ble::transport::{
    PeripheralEvent, PeripheralTransport, ReadRequest, Response, WriteRequest,
};
use crate::ble::uuid::{self as ids, short_value};
use crate::ble::DeviceAddress;
use crate::config::PeripheralConfig;
use crate::error::{Error, Result, UnsupportedReason};
use crate::hid::descriptor::ReportLayout;
use crate::hid::keyboard::{type_text, Keyboard, KeyboardLeds, KeyboardReport};
use crate::hid::mouse::{Mouse, MouseReport};
use crate::hid::{HidProfile, ReportQueue};

pub type AdvertiseCallback = Box<dyn Fn(bool) + Send + Sync>;
pub type ConnectionCallback = Box<dyn Fn(DeviceAddress, u8, ConnectionState) + Send + Sync>;

/// Caller-supplied notifications. Both are invoked from the executor,
/// never while an engine lock is held.
#[derive(Default)]
pub struct PeripheralCallbacks {
    advertise: Option<AdvertiseCallback>,
    connection: Option<ConnectionCallback>,
}

impl PeripheralCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once advertising started, `false` if it failed. Fires at
    /// most once per `start_advertising` call.
    pub fn on_advertise_state_changed(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.advertise = Some(Box::new(f));
        self
    }

    /// `(device, status, new state)` on every connection transition.
    pub fn on_connection_changed(
        mut self,
        f: impl Fn(DeviceAddress, u8, ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.connection = Some(Box::new(f));
        self
    }
}

/// Work item for the serialized executor.
#[derive(Debug)]
enum TransportOp {
    AddService(Uuid),
    StartAdvertising,
    Teardown,
    Notify(Vec<u8>),
    Event(PeripheralEvent),
}

struct EngineState {
    db: GattDatabase,
    info: DeviceInfo,
    connections: ConnectionMachine,
    /// Services waiting for the previous add to complete.
    pending_services: VecDeque<Uuid>,
    server_open: bool,
    advertise_pending: bool,
    registration_error: Option<Error>,
}

type StateCell = Mutex<CriticalSectionRawMutex, RefCell<EngineState>>;

pub struct HidPeripheral<T: PeripheralTransport, P: HidProfile> {
    transport: T,
    profile: P,
    config: PeripheralConfig,
    layout: ReportLayout,
    callbacks: PeripheralCallbacks,
    state: StateCell,
    registry: DeviceRegistry,
    reports: ReportQueue,
    ops: Mutex<CriticalSectionRawMutex, RefCell<VecDeque<TransportOp>>>,
    wake: Signal<CriticalSectionRawMutex, ()>,
    stop: Signal<CriticalSectionRawMutex, ()>,
}

pub type KeyboardPeripheral<T> = HidPeripheral<T, Keyboard>;
pub type MousePeripheral<T> = HidPeripheral<T, Mouse>;

impl<T: PeripheralTransport, P: HidProfile> HidPeripheral<T, P> {
    /// Check the adapter, open the GATT server and queue service
    /// registration. Nothing reaches the stack beyond `open_server` until
    /// the executor runs.
    pub fn new(
        transport: T,
        profile: P,
        config: PeripheralConfig,
        callbacks: PeripheralCallbacks,
    ) -> Result<Self> {
        let adapter = transport.adapter_info();
        if !adapter.present {
            return Err(UnsupportedReason::AdapterMissing.into());
        }
        if !adapter.enabled {
            return Err(UnsupportedReason::AdapterDisabled.into());
        }
        if !adapter.advertising_supported {
            return Err(UnsupportedReason::AdvertisingUnsupported.into());
        }
        transport.open_server().map_err(|e| {
            error!("opening GATT server failed: {}", e);
            Error::Unsupported(UnsupportedReason::ServerOpenFailed)
        })?;

        let report_map = profile.report_map();
        let layout = ReportLayout::parse(report_map).unwrap_or_else(|| {
            warn!("report map is malformed; report sizes unchecked");
            ReportLayout::default()
        });
        check_config(&config, &layout);

        let mut pending_services = VecDeque::new();
        pending_services.push_back(ids::HID_SERVICE);
        pending_services.push_back(ids::DEVICE_INFORMATION_SERVICE);

        let engine = Self {
            transport,
            profile,
            config,
            layout,
            callbacks,
            state: Mutex::new(RefCell::new(EngineState {
                db: GattDatabase::build(&config, report_map),
                info: DeviceInfo::default(),
                connections: ConnectionMachine::new(),
                pending_services,
                server_open: true,
                advertise_pending: false,
                registration_error: None,
            })),
            registry: DeviceRegistry::new(),
            reports: ReportQueue::new(),
            ops: Mutex::new(RefCell::new(VecDeque::new())),
            wake: Signal::new(),
            stop: Signal::new(),
        };
        // Battery goes first; its completion starts the HID -> DIS pipeline.
        engine.submit(TransportOp::AddService(ids::BATTERY_SERVICE));
        Ok(engine)
    }

    /// Construct with the profile's own configuration.
    pub fn with_default_config(transport: T, profile: P, callbacks: PeripheralCallbacks) -> Result<Self> {
        Self::new(transport, profile, P::CONFIG, callbacks)
    }

    // Accessors

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    pub fn report_layout(&self) -> &ReportLayout {
        &self.layout
    }

    /// Snapshot of the GATT database, including last-written values.
    pub fn database(&self) -> GattDatabase {
        self.with_state(|s| s.db.clone())
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.with_state(|s| s.info.clone())
    }

    pub fn registered_devices(&self) -> Vec<DeviceAddress> {
        self.registry.snapshot()
    }

    pub fn connection_state(&self, device: &DeviceAddress) -> ConnectionState {
        self.with_state(|s| s.connections.state(device))
    }

    pub fn queued_reports(&self) -> usize {
        self.reports.len()
    }

    pub fn is_server_open(&self) -> bool {
        self.with_state(|s| s.server_open)
    }

    /// Set when a bounded retry policy gave up on a service.
    pub fn registration_error(&self) -> Option<Error> {
        self.with_state(|s| s.registration_error)
    }

    // Device information

    /// Served as the Model Number and advertised as the local name.
    /// Truncated to 20 UTF-8 bytes.
    pub fn set_device_name(&self, name: &str) {
        self.with_state(|s| s.info.set_device_name(name));
    }

    pub fn set_manufacturer(&self, manufacturer: &str) {
        self.with_state(|s| s.info.set_manufacturer(manufacturer));
    }

    pub fn set_serial_number(&self, serial: &str) {
        self.with_state(|s| s.info.set_serial_number(serial));
    }

    // Advertising

    /// Queue an advertising start. The outcome arrives through the
    /// advertise callback.
    pub fn start_advertising(&self) -> Result<()> {
        self.with_state(|s| {
            if !s.server_open {
                return Err(Error::ServerClosed);
            }
            s.advertise_pending = true;
            Ok(())
        })?;
        self.submit(TransportOp::StartAdvertising);
        Ok(())
    }

    /// Queue teardown: stop advertising, drop every host and close the
    /// server. Returns before any of it has happened.
    pub fn stop_advertising(&self) {
        self.submit(TransportOp::Teardown);
    }

    // Reports

    /// Queue an input report for the pump. Empty reports are ignored.
    pub fn add_input_report(&self, report: &[u8]) {
        let expected = self.layout.input_len();
        if expected != 0 && !report.is_empty() && report.len() != expected {
            warn!(
                "input report is {} bytes, report map declares {}",
                report.len(),
                expected
            );
        }
        self.reports.push(report);
    }

    // Events

    /// Feed a transport callback to the engine.
    pub fn handle_event(&self, event: PeripheralEvent) {
        self.submit(TransportOp::Event(event));
    }

    // Driving

    /// Execute every queued operation, including ones queued while
    /// draining.
    pub async fn run_pending(&self) {
        while let Some(op) = self.next_op() {
            self.execute(op).await;
        }
    }

    /// One pump period: hand at most one queued report to the executor.
    /// Returns whether a report was dequeued.
    pub fn pump_tick(&self) -> bool {
        let Some(report) = self.reports.pop() else {
            return false;
        };
        if self.config.need_input_report {
            self.submit(TransportOp::Notify(report));
        }
        true
    }

    /// Run the executor and the notification pump until [`shutdown`].
    ///
    /// [`shutdown`]: Self::shutdown
    pub async fn run(&self) {
        info!(
            "HID peripheral running, notify interval {} ms",
            self.config.notify_interval_ms
        );
        match select3(self.run_executor(), self.run_pump(), self.stop.wait()).await {
            Either3::First(()) | Either3::Second(()) => {}
            Either3::Third(()) => info!("HID peripheral stopped"),
        }
    }

    pub fn shutdown(&self) {
        self.stop.signal(());
    }

    async fn run_executor(&self) {
        loop {
            self.wake.wait().await;
            self.run_pending().await;
        }
    }

    async fn run_pump(&self) {
        let mut ticker = Ticker::every(self.config.notify_interval());
        loop {
            ticker.next().await;
            self.pump_tick();
        }
    }

    // Executor internals

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        self.state.lock(|s| f(&mut s.borrow_mut()))
    }

    fn submit(&self, op: TransportOp) {
        self.ops.lock(|ops| ops.borrow_mut().push_back(op));
        self.wake.signal(());
    }

    fn next_op(&self) -> Option<TransportOp> {
        self.ops.lock(|ops| ops.borrow_mut().pop_front())
    }

    async fn execute(&self, op: TransportOp) {
        if !self.is_server_open() {
            debug!("server closed, dropping {:?}", op);
            return;
        }
        match op {
            TransportOp::AddService(uuid) => self.add_service(uuid).await,
            TransportOp::StartAdvertising => self.begin_advertising(),
            TransportOp::Teardown => self.teardown(),
            TransportOp::Notify(report) => self.notify_all(&report),
            TransportOp::Event(event) => self.dispatch_event(event).await,
        }
    }

    async fn add_service(&self, uuid: Uuid) {
        let Some(service) = self.with_state(|s| s.db.service(&uuid).cloned()) else {
            return;
        };
        let short = short_value(&uuid);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.transport.add_service(&service) {
                Ok(()) => {
                    debug!("service {:#06x} submitted (attempt {})", short, attempts);
                    return;
                }
                Err(e) => {
                    warn!(
                        "adding service {:#06x} failed (attempt {}): {}",
                        short, attempts, e
                    );
                    if !self.config.retry.should_retry(attempts) {
                        let err = Error::ServiceRegistration {
                            service: short,
                            attempts,
                        };
                        error!("{}", err);
                        self.with_state(|s| {
                            s.registration_error = Some(err);
                            s.pending_services.clear();
                        });
                        return;
                    }
                    match self.config.retry.backoff() {
                        Some(delay) => Timer::after(delay).await,
                        None => yield_now().await,
                    }
                }
            }
        }
    }

    fn begin_advertising(&self) {
        let name = self.with_state(|s| s.info.device_name.clone());
        let params = AdvertisingParams::hid(&name);
        match self.transport.start_advertising(&params) {
            Ok(()) => info!("advertising as {:?}", name.as_str()),
            Err(e) => {
                warn!("start advertising failed: {}", e);
                self.finish_advertising(false);
            }
        }
    }

    fn finish_advertising(&self, started: bool) {
        let pending = self.with_state(|s| core::mem::replace(&mut s.advertise_pending, false));
        if !pending {
            return;
        }
        if let Some(callback) = &self.callbacks.advertise {
            callback(started);
        }
    }

    fn teardown(&self) {
        if let Err(e) = self.transport.stop_advertising() {
            debug!("stop advertising: {}", e);
        }
        for device in self.registry.drain() {
            if let Err(e) = self.transport.cancel_connection(device) {
                debug!("cancel connection {}: {}", device, e);
            }
        }
        self.transport.close_server();
        self.with_state(|s| {
            s.server_open = false;
            s.advertise_pending = false;
            s.pending_services.clear();
            s.connections.reset();
        });
        info!("GATT server closed");
    }

    fn notify_all(&self, report: &[u8]) {
        let handle = self.with_state(|s| {
            let handle = s.db.input_report()?;
            s.db.set_value(handle, report);
            Some(handle)
        });
        let Some(handle) = handle else {
            return;
        };
        for device in self.registry.snapshot() {
            if let Err(e) = self.transport.notify(device, handle, report) {
                debug!("notify {} failed: {}", device, e);
            }
        }
    }

    async fn dispatch_event(&self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::ConnectionStateChanged {
                device,
                status,
                link,
                bond,
            } => {
                info!(
                    "connection {}: {:?} bond {:?} (status {})",
                    device, link, bond, status
                );
                let transition =
                    self.with_state(|s| s.connections.on_link_event(device, link, bond));
                if let Some(transition) = transition {
                    self.apply(transition, status);
                }
            }
            PeripheralEvent::BondStateChanged { device, bond } => {
                match self.with_state(|s| s.connections.on_bond_event(device, bond)) {
                    Some(transition) => {
                        info!("{} bonded", device);
                        self.apply(transition, 0);
                    }
                    None => debug!("bond state {:?} for {} ignored", bond, device),
                }
            }
            PeripheralEvent::ServiceAdded { status, service } => {
                if status.is_success() {
                    info!("service {:#06x} added", short_value(&service));
                } else {
                    warn!(
                        "service {:#06x} add failed: {:?}",
                        short_value(&service),
                        status
                    );
                }
                let next = self.with_state(|s| s.pending_services.pop_front());
                if let Some(next) = next {
                    self.add_service(next).await;
                }
            }
            PeripheralEvent::AdvertisingStarted => {
                info!("advertising started");
                self.finish_advertising(true);
            }
            PeripheralEvent::AdvertisingFailed { code } => {
                warn!("advertising failed with code {}", code);
                self.finish_advertising(false);
            }
            PeripheralEvent::CharacteristicRead(request) => self.answer_read(request, false),
            PeripheralEvent::DescriptorRead(request) => self.answer_read(request, true),
            PeripheralEvent::CharacteristicWrite(request) => self.answer_write(request, false),
            PeripheralEvent::DescriptorWrite(request) => self.answer_write(request, true),
        }
    }

    fn apply(&self, transition: Transition, status: u8) {
        for action in &transition.actions {
            match *action {
                ConnectionAction::BeginBonding(device) => {
                    if let Err(e) = self.transport.set_pairing_confirmation(device, true) {
                        debug!("pairing confirmation for {}: {}", device, e);
                    }
                    if let Err(e) = self.transport.create_bond(device) {
                        warn!("create bond with {} failed: {}", device, e);
                    }
                }
                ConnectionAction::Connect(device) => {
                    if let Err(e) = self.transport.connect(device, true) {
                        warn!("connect to {} failed: {}", device, e);
                    }
                }
                ConnectionAction::Register(device) => {
                    self.registry.insert(device);
                }
                ConnectionAction::Unregister(device) => {
                    self.registry.remove(&device);
                }
            }
        }
        debug!("{} -> {:?}", transition.device, transition.state);
        if let Some(callback) = &self.callbacks.connection {
            callback(transition.device, status, transition.state);
        }
    }

    fn answer_read(&self, request: ReadRequest, descriptor: bool) {
        let report_map = self.profile.report_map();
        let reply = self.with_state(|s| {
            dispatch_read(&s.db, &s.info, report_map, &request, descriptor)
        });
        debug!(
            "read {:?} offset {} -> {:?} ({} bytes)",
            request.handle,
            request.offset,
            reply.status,
            reply.value.len()
        );
        self.respond(request.device, request.request_id, reply);
    }

    fn answer_write(&self, request: WriteRequest, descriptor: bool) {
        let outcome = self.with_state(|s| dispatch_write(&mut s.db, &request, descriptor));
        debug!(
            "write {:?} {:02X?} (response needed: {}, prepared: {})",
            request.handle, request.value, request.response_needed, request.prepared
        );
        if let Some(report) = outcome.output_report {
            self.profile.on_output_report(&report);
        }
        if let Some(reply) = outcome.reply {
            self.respond(request.device, request.request_id, reply);
        }
    }

    fn respond(&self, device: DeviceAddress, request_id: u32, reply: Reply) {
        let response = Response {
            device,
            request_id,
            status: reply.status,
            offset: reply.offset,
            value: reply.value,
        };
        if let Err(e) = self.transport.send_response(&response) {
            warn!("response {} to {} failed: {}", request_id, device, e);
        }
    }
}

fn check_config(config: &PeripheralConfig, layout: &ReportLayout) {
    if config.need_output_report && layout.output_bits == 0 {
        warn!("output report configured but the report map declares none");
    }
    if config.need_feature_report && layout.feature_bits == 0 {
        warn!("feature report configured but the report map declares none");
    }
    if !config.need_input_report {
        info!("no input report configured; queued reports will be discarded");
    }
}

impl<T: PeripheralTransport> HidPeripheral<T, Keyboard> {
    /// Type `text`: press and release per character, then a final release.
    pub fn send_keys(&self, text: &str) {
        for report in type_text(text) {
            self.add_input_report(&report.to_bytes());
        }
    }

    /// Press `keycode` with `modifier` held, until [`send_key_up`].
    ///
    /// [`send_key_up`]: Self::send_key_up
    pub fn send_key_down(&self, modifier: u8, keycode: u8) {
        self.add_input_report(&KeyboardReport::key(modifier, keycode).to_bytes());
    }

    pub fn send_key_up(&self) {
        self.add_input_report(&KeyboardReport::empty().to_bytes());
    }

    /// LED state last written by the host.
    pub fn leds(&self) -> KeyboardLeds {
        self.profile.leds()
    }
}

impl<T: PeripheralTransport> HidPeripheral<T, Mouse> {
    /// Queue a pointer report. Deltas are clamped to `-127..=127`; an idle
    /// report following an idle report is dropped.
    pub fn move_pointer(&self, dx: i32, dy: i32, wheel: i32, left: bool, right: bool, middle: bool) {
        let report = MouseReport::new(dx, dy, wheel, left, right, middle);
        if let Some(report) = self.profile.next_report(report) {
            self.add_input_report(&report.to_bytes());
        }
    }
}
