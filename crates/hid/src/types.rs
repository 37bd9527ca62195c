//! Device type definitions
//!
//! This module defines the identity and descriptor snapshot types produced by
//! bus enumeration and consumed by the discovery and reader loops.

use crate::error::HidError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one attached device instance
///
/// Derived from the bus number and the address the host assigned to the
/// device. A re-plugged device receives a new address and therefore a new
/// identity. The identity remains valid (and comparable) after the device is
/// gone, unlike the live handle it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
}

impl DeviceIdentity {
    pub const fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

/// USB device class
///
/// Closed set of the standard class codes. Codes outside this table are
/// rejected by [`DeviceClass::try_from`] rather than folded into `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeviceClass {
    /// Class defined per interface
    Unknown = 0x00,
    Audio = 0x01,
    Communications = 0x02,
    Hid = 0x03,
    Physical = 0x05,
    Image = 0x06,
    Printer = 0x07,
    MassStorage = 0x08,
    Hub = 0x09,
    CdcData = 0x0a,
    SmartCard = 0x0b,
    ContentSecurity = 0x0d,
    Video = 0x0e,
    PersonalHealthcare = 0x0f,
    AudioVideo = 0x10,
    Billboard = 0x11,
    UsbTypeCBridge = 0x12,
    DiagnosticDevice = 0xdc,
    WirelessController = 0xe0,
    Miscellaneous = 0xef,
    ApplicationSpecific = 0xfe,
    VendorSpecific = 0xff,
}

impl DeviceClass {
    /// Raw class code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable class name
    pub fn name(self) -> &'static str {
        match self {
            DeviceClass::Unknown => "UNKNOWN",
            DeviceClass::Audio => "AUDIO",
            DeviceClass::Communications => "COMMUNICATIONS",
            DeviceClass::Hid => "HID",
            DeviceClass::Physical => "PHYSICAL",
            DeviceClass::Image => "IMAGE",
            DeviceClass::Printer => "PRINTER",
            DeviceClass::MassStorage => "MASS_STORAGE",
            DeviceClass::Hub => "HUB",
            DeviceClass::CdcData => "CDC_DATA",
            DeviceClass::SmartCard => "SMART_CARD",
            DeviceClass::ContentSecurity => "CONTENT_SECURITY",
            DeviceClass::Video => "VIDEO",
            DeviceClass::PersonalHealthcare => "PERSONAL_HEALTHCARE",
            DeviceClass::AudioVideo => "AUDIO_VIDEO",
            DeviceClass::Billboard => "BILLBOARD",
            DeviceClass::UsbTypeCBridge => "USB_TYPE_C_BRIDGE",
            DeviceClass::DiagnosticDevice => "DIAGNOSTIC_DEVICE",
            DeviceClass::WirelessController => "WIRELESS_CONTROLLER",
            DeviceClass::Miscellaneous => "MISCELLANEOUS",
            DeviceClass::ApplicationSpecific => "APPLICATION_SPECIFIC",
            DeviceClass::VendorSpecific => "VENDOR_SPECIFIC",
        }
    }
}

impl TryFrom<u8> for DeviceClass {
    type Error = HidError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let class = match code {
            0x00 => DeviceClass::Unknown,
            0x01 => DeviceClass::Audio,
            0x02 => DeviceClass::Communications,
            0x03 => DeviceClass::Hid,
            0x05 => DeviceClass::Physical,
            0x06 => DeviceClass::Image,
            0x07 => DeviceClass::Printer,
            0x08 => DeviceClass::MassStorage,
            0x09 => DeviceClass::Hub,
            0x0a => DeviceClass::CdcData,
            0x0b => DeviceClass::SmartCard,
            0x0d => DeviceClass::ContentSecurity,
            0x0e => DeviceClass::Video,
            0x0f => DeviceClass::PersonalHealthcare,
            0x10 => DeviceClass::AudioVideo,
            0x11 => DeviceClass::Billboard,
            0x12 => DeviceClass::UsbTypeCBridge,
            0xdc => DeviceClass::DiagnosticDevice,
            0xe0 => DeviceClass::WirelessController,
            0xef => DeviceClass::Miscellaneous,
            0xfe => DeviceClass::ApplicationSpecific,
            0xff => DeviceClass::VendorSpecific,
            other => return Err(HidError::UnknownClass(other)),
        };
        Ok(class)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First endpoint of the first interface of the first configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Interface number the endpoint belongs to
    pub interface_number: u8,
    /// Class code of that interface (`bInterfaceClass`)
    pub interface_class: u8,
    /// Endpoint address (bit 7 set for IN endpoints)
    pub address: u8,
    /// Maximum packet size in bytes
    pub max_packet_size: u16,
}

impl EndpointDescriptor {
    /// Direction bit of the endpoint address
    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }

    /// Whether the owning interface is a HID interface
    ///
    /// Keyboards usually report device class 0x00 and declare HID only at
    /// the interface level.
    pub fn is_hid(&self) -> bool {
        self.interface_class == DeviceClass::Hid.code()
    }
}

/// Immutable description of one bus device at discovery time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Registry key
    pub identity: DeviceIdentity,
    /// Device class from the device descriptor
    pub device_class: DeviceClass,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Interrupt endpoint, if the descriptors expose one
    pub endpoint: Option<EndpointDescriptor>,
}

impl DeviceSnapshot {
    /// One-line inventory description
    pub fn summary(&self) -> String {
        format!(
            "Class: {}, Vendor ID: {:#06x}, Product ID: {:#06x}",
            self.device_class, self.vendor_id, self.product_id
        )
    }

    /// Whether the device exposes an endpoint on a HID interface
    pub fn has_hid_endpoint(&self) -> bool {
        self.endpoint.is_some_and(|ep| ep.is_hid())
    }
}
