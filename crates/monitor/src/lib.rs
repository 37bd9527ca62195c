//! USB HID monitor library
//!
//! Watches the USB bus for newly attached devices and decodes the keyboard
//! reports of every new HID device into a readable stream.
//!
//! The pieces are split so they can be driven by the binary or by tests:
//! - [`discovery`]: periodic enumeration and new-device detection
//! - [`registry`]: the set of devices already seen
//! - [`usb`]: bus access and the per-device reader loop
//! - [`render`]: turns monitor events into output
//! - [`config`]: TOML configuration

pub mod config;
pub mod discovery;
pub mod registry;
pub mod render;
pub mod usb;

pub use config::{MonitorConfig, OutputFormat};
pub use discovery::{DiscoveryConfig, DiscoveryLoop, DiscoveryState};
pub use registry::DeviceRegistry;
pub use render::run_renderer;
