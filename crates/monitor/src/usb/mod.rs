//! USB subsystem
//!
//! Bus access and per-device reading:
//! - [`bus`]: the `UsbBus` / `EndpointChannel` seam the loops are written against
//! - [`manager`]: libusb enumeration into device snapshots, VID:PID filters
//! - [`device`]: opened device handles with driver detach / claim / release
//! - [`transfers`]: timed interrupt reads and error classification
//! - [`worker`]: the per-device reader loop and its thread
//! - [`mock`]: scripted bus used by tests
//!
//! USB reads are blocking, so every reader runs on its own OS thread and
//! talks to the Tokio runtime only through the event bridge.

pub mod bus;
pub mod device;
pub mod manager;
pub mod mock;
pub mod transfers;
pub mod worker;

// Re-export public types
pub use bus::{EndpointChannel, UsbBus};
pub use device::RusbChannel;
pub use manager::{RusbBus, check_filter};
pub use transfers::{BusError, ErrorClass};
pub use worker::{ReadLoop, ReadLoopConfig, ReadLoopExit, SetupError, spawn_reader};
