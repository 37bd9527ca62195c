//! Common utilities for usb-hid-monitor
//!
//! This crate provides the ambient pieces shared by the monitor binary and its
//! tests: error handling, logging setup, the event bridge that carries reports
//! from blocking reader threads to the async runtime, and the shutdown signal.

pub mod channel;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod test_utils;

pub use channel::{EventReceiver, EventSender, MonitorEvent, ReportSink, create_event_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use shutdown::{ShutdownListener, ShutdownTrigger, shutdown_channel};
