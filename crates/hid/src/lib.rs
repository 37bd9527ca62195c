//! HID types for usb-hid-monitor
//!
//! This crate defines the value types shared by the discovery and reader
//! loops: stable device identities, immutable device snapshots, the USB class
//! table, and the boot-keyboard scancode table used to turn raw interrupt
//! reports into readable tokens.
//!
//! Everything here is pure: no I/O, no threads, no global state.
//!
//! # Example
//!
//! ```
//! use hid::{DecodedStream, decode_report};
//!
//! // Boot keyboard report: modifier byte, reserved byte, then up to six keys
//! let report = [0x00, 0x00, 0x04, 0x05, 0x00, 0x00, 0x00, 0x00];
//!
//! let mut stream = DecodedStream::new();
//! stream.extend(decode_report(&report));
//! assert_eq!(stream.as_str(), "ab");
//! ```

pub mod error;
pub mod scancode;
pub mod stream;
pub mod types;

pub use error::{HidError, Result};
pub use scancode::{REPORT_HEADER_LEN, Token, decode, decode_report};
pub use stream::DecodedStream;
pub use types::{DeviceClass, DeviceIdentity, DeviceSnapshot, EndpointDescriptor};
