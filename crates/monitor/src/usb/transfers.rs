//! Interrupt transfer execution and bus error classification
//!
//! Maps rusb errors onto the small [`BusError`] taxonomy the reader loop acts
//! on, and performs timed interrupt reads.

use rusb::{Context, DeviceHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Errors reported by the bus access layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The device is gone (no such device)
    #[error("Device disconnected")]
    Disconnected,

    /// A timed operation expired without data
    #[error("Operation timed out")]
    TimedOut,

    /// Insufficient permissions
    #[error("Access denied")]
    Access,

    /// Interface or device already in use
    #[error("Resource busy")]
    Busy,

    /// Any other platform error
    #[error("{0}")]
    Other(String),
}

/// How the reader loop treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Terminates the reader loop for the device
    Disconnect,
    /// Expected while a device is idle, loop continues
    Timeout,
    /// Logged, loop continues
    Transient,
}

impl BusError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BusError::Disconnected => ErrorClass::Disconnect,
            BusError::TimedOut => ErrorClass::Timeout,
            BusError::Access | BusError::Busy | BusError::Other(_) => ErrorClass::Transient,
        }
    }
}

impl From<rusb::Error> for BusError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::NoDevice => BusError::Disconnected,
            rusb::Error::Timeout => BusError::TimedOut,
            rusb::Error::Access => BusError::Access,
            rusb::Error::Busy => BusError::Busy,
            _ => BusError::Other(err.to_string()),
        }
    }
}

/// Execute one timed interrupt IN transfer
///
/// Returns the bytes actually received (at most `max_len`).
pub fn read_interrupt(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, BusError> {
    let mut buffer = vec![0u8; max_len];
    let len = handle.read_interrupt(endpoint, &mut buffer, timeout)?;
    buffer.truncate(len);

    trace!(
        "Interrupt transfer: endpoint={:#x}, {} bytes",
        endpoint,
        buffer.len()
    );
    Ok(buffer)
}
