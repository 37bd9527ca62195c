//! libusb-backed bus access
//!
//! Enumerates attached devices into [`DeviceSnapshot`]s and opens them by
//! identity. Also hosts the VID:PID filter matching used to decide which new
//! devices get a reader.

use crate::usb::bus::UsbBus;
use crate::usb::device::RusbChannel;
use crate::usb::transfers::BusError;
use hid::{DeviceClass, DeviceIdentity, DeviceSnapshot, EndpointDescriptor};
use rusb::{Context, Device, UsbContext};
use tracing::debug;

/// Bus access through a libusb context
pub struct RusbBus {
    /// USB context for device operations
    context: Context,
}

impl RusbBus {
    /// Create a new libusb context
    pub fn new() -> Result<Self, BusError> {
        let context = Context::new()?;
        Ok(Self { context })
    }

    /// Build a snapshot from a live device
    ///
    /// Returns `None` for devices whose descriptor cannot be read or whose
    /// class code is not in the class table.
    fn snapshot(device: &Device<Context>) -> Option<DeviceSnapshot> {
        let identity = DeviceIdentity::new(device.bus_number(), device.address());

        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!("Skipping device {}: no device descriptor: {}", identity, e);
                return None;
            }
        };

        let device_class = match DeviceClass::try_from(descriptor.class_code()) {
            Ok(class) => class,
            Err(e) => {
                debug!("Skipping device {}: {}", identity, e);
                return None;
            }
        };

        Some(DeviceSnapshot {
            identity,
            device_class,
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            endpoint: Self::first_endpoint(device),
        })
    }

    /// First endpoint of interface 0, alternate setting 0, of configuration 0
    fn first_endpoint(device: &Device<Context>) -> Option<EndpointDescriptor> {
        let config = device.config_descriptor(0).ok()?;
        let interface = config.interfaces().next()?;
        let setting = interface.descriptors().next()?;
        let endpoint = setting.endpoint_descriptors().next()?;

        Some(EndpointDescriptor {
            interface_number: setting.interface_number(),
            interface_class: setting.class_code(),
            address: endpoint.address(),
            max_packet_size: endpoint.max_packet_size(),
        })
    }
}

impl UsbBus for RusbBus {
    type Channel = RusbChannel;

    fn enumerate(&self) -> Result<Vec<DeviceSnapshot>, BusError> {
        let devices = self.context.devices()?;
        let snapshots: Vec<DeviceSnapshot> = devices
            .iter()
            .filter_map(|d| Self::snapshot(&d))
            .collect();

        debug!("Enumerated {} devices", snapshots.len());
        Ok(snapshots)
    }

    fn open(&self, identity: DeviceIdentity) -> Result<RusbChannel, BusError> {
        let devices = self.context.devices()?;
        let device = devices
            .iter()
            .find(|d| d.bus_number() == identity.bus && d.address() == identity.address)
            .ok_or(BusError::Disconnected)?;

        let handle = device.open()?;
        Ok(RusbChannel::new(identity, handle))
    }
}

/// Check if a VID/PID pair is allowed by the filters
///
/// Filter format: "0xVID:0xPID", "0xVID:*", "*:0xPID" or "*:*". An empty
/// filter list allows every device. Filters are validated by the config
/// loader; malformed entries never match.
pub fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }

    filters.iter().any(|filter| {
        let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
            return false;
        };
        id_matches(filter_vid, vid) && id_matches(filter_pid, pid)
    })
}

fn id_matches(pattern: &str, value: u16) -> bool {
    if pattern == "*" {
        return true;
    }

    let hex = pattern
        .strip_prefix("0x")
        .or_else(|| pattern.strip_prefix("0X"))
        .unwrap_or(pattern);
    u16::from_str_radix(hex, 16)
        .map(|v| v == value)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_logic() {
        let filters = vec![
            "0x1234:0x5678".to_string(), // Exact match
            "0xABCD:*".to_string(),      // Wildcard PID
        ];

        // Should match exact
        assert!(check_filter(0x1234, 0x5678, &filters));

        // Should match wildcard
        assert!(check_filter(0xABCD, 0x1111, &filters));
        assert!(check_filter(0xABCD, 0x9999, &filters));

        // Should not match
        assert!(!check_filter(0x1234, 0x9999, &filters)); // Wrong PID
        assert!(!check_filter(0x9999, 0x5678, &filters)); // Wrong VID
        assert!(!check_filter(0x0000, 0x0000, &filters));

        // Empty filters = allow all
        assert!(check_filter(0x1234, 0x5678, &[]));
    }

    #[test]
    fn test_filter_wildcard_vid() {
        let filters = vec!["*:0xc31c".to_string()];
        assert!(check_filter(0x046d, 0xc31c, &filters));
        assert!(!check_filter(0x046d, 0xc31d, &filters));
    }

    #[test]
    fn test_malformed_filter_never_matches() {
        let filters = vec!["0x1234".to_string(), "0xZZZZ:*".to_string()];
        assert!(!check_filter(0x1234, 0x0001, &filters));
    }

    #[test]
    fn test_rusb_bus_creation() {
        // Context creation may fail without USB access; only exercise the call
        match RusbBus::new() {
            Ok(bus) => {
                if let Ok(devices) = bus.enumerate() {
                    for device in devices {
                        assert_eq!(device.device_class.code(), device.device_class as u8);
                    }
                }
            }
            Err(e) => {
                eprintln!("USB context creation failed (expected without libusb access): {}", e);
            }
        }
    }
}
