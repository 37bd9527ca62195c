//! Scripted bus for tests
//!
//! [`MockBus`] replays a queue of enumeration results and, per device, a queue
//! of read outcomes. Once a device's read script is exhausted, reads behave
//! like an idle keyboard: they wait briefly and time out. Once the
//! enumeration queue is exhausted, the last successful device list repeats.
//!
//! # Example
//!
//! ```
//! use monitor::usb::mock::MockBus;
//! use monitor::usb::{BusError, UsbBus};
//! use common::test_utils::hid_keyboard_snapshot;
//!
//! let bus = MockBus::new();
//! let kbd = hid_keyboard_snapshot(1, 4);
//! bus.push_enumeration(Ok(vec![kbd.clone()]));
//! bus.script_reads(kbd.identity, vec![Ok(vec![0, 0, 4, 0, 0, 0, 0, 0]), Err(BusError::Disconnected)]);
//!
//! assert_eq!(bus.enumerate().unwrap(), vec![kbd]);
//! ```

use crate::usb::bus::{EndpointChannel, UsbBus};
use crate::usb::transfers::BusError;
use hid::{DeviceIdentity, DeviceSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Upper bound on how long an idle mock read blocks
const IDLE_READ: Duration = Duration::from_millis(5);

#[derive(Debug, Default)]
struct MockDevice {
    reads: VecDeque<Result<Vec<u8>, BusError>>,
    driver_attached: bool,
    detach_error: Option<BusError>,
    claim_error: Option<BusError>,
    open_error: Option<BusError>,
    read_attempts: usize,
    detach_calls: usize,
    claimed: bool,
    opened: usize,
    closed: usize,
}

#[derive(Debug, Default)]
struct MockState {
    enumerations: VecDeque<Result<Vec<DeviceSnapshot>, BusError>>,
    steady: Vec<DeviceSnapshot>,
    enumerate_calls: usize,
    devices: HashMap<DeviceIdentity, MockDevice>,
}

/// Scripted [`UsbBus`] implementation
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the result of the next enumerate() call
    pub fn push_enumeration(&self, result: Result<Vec<DeviceSnapshot>, BusError>) {
        self.lock().enumerations.push_back(result);
    }

    /// Replace the device list returned once the queue is drained
    pub fn set_devices(&self, devices: Vec<DeviceSnapshot>) {
        self.lock().steady = devices;
    }

    /// Queue read outcomes for a device
    pub fn script_reads(&self, identity: DeviceIdentity, reads: Vec<Result<Vec<u8>, BusError>>) {
        self.lock()
            .devices
            .entry(identity)
            .or_default()
            .reads
            .extend(reads);
    }

    /// Mark the device's interface as owned by a kernel driver
    pub fn set_driver_attached(&self, identity: DeviceIdentity, attached: bool) {
        self.lock().devices.entry(identity).or_default().driver_attached = attached;
    }

    /// Make detach_driver fail for a device
    pub fn fail_detach(&self, identity: DeviceIdentity, error: BusError) {
        self.lock().devices.entry(identity).or_default().detach_error = Some(error);
    }

    /// Make claim_interface fail for a device
    pub fn fail_claim(&self, identity: DeviceIdentity, error: BusError) {
        self.lock().devices.entry(identity).or_default().claim_error = Some(error);
    }

    /// Make open fail for a device
    pub fn fail_open(&self, identity: DeviceIdentity, error: BusError) {
        self.lock().devices.entry(identity).or_default().open_error = Some(error);
    }

    /// Number of enumerate() calls so far
    pub fn enumerate_calls(&self) -> usize {
        self.lock().enumerate_calls
    }

    /// Number of read attempts made on a device
    pub fn read_attempts(&self, identity: DeviceIdentity) -> usize {
        self.device_stat(identity, |d| d.read_attempts)
    }

    /// Number of detach_driver() calls made on a device
    pub fn detach_calls(&self, identity: DeviceIdentity) -> usize {
        self.device_stat(identity, |d| d.detach_calls)
    }

    /// Number of times a device was opened
    pub fn open_count(&self, identity: DeviceIdentity) -> usize {
        self.device_stat(identity, |d| d.opened)
    }

    /// Number of channels for a device that have been dropped
    pub fn close_count(&self, identity: DeviceIdentity) -> usize {
        self.device_stat(identity, |d| d.closed)
    }

    /// Whether the device's interface was claimed
    pub fn was_claimed(&self, identity: DeviceIdentity) -> bool {
        self.lock()
            .devices
            .get(&identity)
            .map(|d| d.claimed)
            .unwrap_or(false)
    }

    fn device_stat(&self, identity: DeviceIdentity, f: impl Fn(&MockDevice) -> usize) -> usize {
        self.lock().devices.get(&identity).map(f).unwrap_or(0)
    }
}

impl UsbBus for MockBus {
    type Channel = MockChannel;

    fn enumerate(&self) -> Result<Vec<DeviceSnapshot>, BusError> {
        let mut state = self.lock();
        state.enumerate_calls += 1;

        match state.enumerations.pop_front() {
            Some(Ok(devices)) => {
                state.steady = devices.clone();
                Ok(devices)
            }
            Some(Err(e)) => Err(e),
            None => Ok(state.steady.clone()),
        }
    }

    fn open(&self, identity: DeviceIdentity) -> Result<MockChannel, BusError> {
        let mut state = self.lock();
        let device = state.devices.entry(identity).or_default();
        if let Some(e) = device.open_error.clone() {
            return Err(e);
        }
        device.opened += 1;

        Ok(MockChannel {
            identity,
            state: self.state.clone(),
        })
    }
}

/// Channel handed out by [`MockBus::open`]
#[derive(Debug)]
pub struct MockChannel {
    identity: DeviceIdentity,
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    fn with_device<T>(&self, f: impl FnOnce(&mut MockDevice) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(state.devices.entry(self.identity).or_default())
    }
}

impl EndpointChannel for MockChannel {
    fn is_driver_attached(&self, _interface: u8) -> Result<bool, BusError> {
        Ok(self.with_device(|d| d.driver_attached))
    }

    fn detach_driver(&mut self, _interface: u8) -> Result<(), BusError> {
        self.with_device(|d| {
            d.detach_calls += 1;
            match d.detach_error.clone() {
                Some(e) => Err(e),
                None => {
                    d.driver_attached = false;
                    Ok(())
                }
            }
        })
    }

    fn claim_interface(&mut self, _interface: u8) -> Result<(), BusError> {
        self.with_device(|d| match d.claim_error.clone() {
            Some(e) => Err(e),
            None => {
                d.claimed = true;
                Ok(())
            }
        })
    }

    fn read_endpoint(
        &mut self,
        _endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError> {
        let next = self.with_device(|d| {
            d.read_attempts += 1;
            d.reads.pop_front()
        });

        match next {
            Some(Ok(mut data)) => {
                data.truncate(max_len);
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => {
                std::thread::sleep(timeout.min(IDLE_READ));
                Err(BusError::TimedOut)
            }
        }
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.with_device(|d| {
            d.claimed = false;
            d.closed += 1;
        });
    }
}
