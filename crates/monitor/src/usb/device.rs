//! Opened USB device
//!
//! This module provides [`RusbChannel`], a wrapper around an open
//! rusb::DeviceHandle that remembers which interfaces it claimed and which
//! kernel drivers it detached, and undoes both when dropped.

use crate::usb::bus::EndpointChannel;
use crate::usb::transfers::{BusError, read_interrupt};
use hid::DeviceIdentity;
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Open device handle owned by one reader loop
pub struct RusbChannel {
    /// Device identity (for logging)
    identity: DeviceIdentity,
    /// Underlying rusb handle
    handle: DeviceHandle<Context>,
    /// Interfaces claimed by us
    claimed_interfaces: Vec<u8>,
    /// Interfaces whose kernel driver we detached
    detached_interfaces: Vec<u8>,
}

impl RusbChannel {
    pub fn new(identity: DeviceIdentity, handle: DeviceHandle<Context>) -> Self {
        debug!("Opened device {}", identity);
        Self {
            identity,
            handle,
            claimed_interfaces: Vec::new(),
            detached_interfaces: Vec::new(),
        }
    }

    /// Release claimed interfaces and reattach kernel drivers
    ///
    /// Restores the device to normal kernel control. Failures are expected
    /// once the device is unplugged and are only logged at debug level.
    fn close(&mut self) {
        for interface in self.claimed_interfaces.drain(..) {
            if let Err(e) = self.handle.release_interface(interface) {
                debug!(
                    "Could not release interface {} on device {}: {}",
                    interface, self.identity, e
                );
            }
        }

        for interface in self.detached_interfaces.drain(..) {
            match self.handle.attach_kernel_driver(interface) {
                Ok(()) => debug!(
                    "Reattached kernel driver to interface {} on device {}",
                    interface, self.identity
                ),
                Err(e) => debug!(
                    "Could not reattach kernel driver to interface {} on device {}: {}",
                    interface, self.identity, e
                ),
            }
        }

        debug!("Closed device {}", self.identity);
    }
}

impl EndpointChannel for RusbChannel {
    fn is_driver_attached(&self, interface: u8) -> Result<bool, BusError> {
        Ok(self.handle.kernel_driver_active(interface)?)
    }

    fn detach_driver(&mut self, interface: u8) -> Result<(), BusError> {
        self.handle.detach_kernel_driver(interface).map_err(|e| {
            warn!(
                "Failed to detach kernel driver from interface {} on device {}: {}",
                interface, self.identity, e
            );
            BusError::from(e)
        })?;

        debug!(
            "Detached kernel driver from interface {} on device {}",
            interface, self.identity
        );
        self.detached_interfaces.push(interface);
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), BusError> {
        self.handle.claim_interface(interface)?;
        debug!("Claimed interface {} on device {}", interface, self.identity);
        self.claimed_interfaces.push(interface);
        Ok(())
    }

    fn read_endpoint(
        &mut self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, BusError> {
        read_interrupt(&self.handle, endpoint, max_len, timeout)
    }
}

impl Drop for RusbChannel {
    fn drop(&mut self) {
        self.close();
    }
}
