//! Bus access seam
//!
//! The discovery and reader loops only talk to the bus through these two
//! traits. [`crate::usb::RusbBus`] implements them on top of libusb, and
//! [`crate::usb::mock::MockBus`] scripts them for tests.

use crate::usb::transfers::BusError;
use hid::{DeviceIdentity, DeviceSnapshot};
use std::time::Duration;

/// Enumerate devices and open them for reading
pub trait UsbBus: Send + Sync + 'static {
    type Channel: EndpointChannel + 'static;

    /// List currently attached devices
    fn enumerate(&self) -> Result<Vec<DeviceSnapshot>, BusError>;

    /// Open a device by identity
    ///
    /// Fails with [`BusError::Disconnected`] if the device is no longer
    /// attached.
    fn open(&self, identity: DeviceIdentity) -> Result<Self::Channel, BusError>;
}

/// An opened device, owned by exactly one reader loop
///
/// Implementations release claimed interfaces and reattach detached kernel
/// drivers when dropped.
pub trait EndpointChannel: Send {
    /// Whether a kernel driver currently owns the interface
    fn is_driver_attached(&self, interface: u8) -> Result<bool, BusError>;

    /// Detach the kernel driver from the interface
    fn detach_driver(&mut self, interface: u8) -> Result<(), BusError>;

    /// Claim the interface for user-space transfers
    fn claim_interface(&mut self, interface: u8) -> Result<(), BusError>;

    /// Timed blocking read of up to `max_len` bytes from an interrupt endpoint
    fn read_endpoint(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError>;
}
