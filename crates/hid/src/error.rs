//! HID error types

use thiserror::Error;

/// Errors raised while interpreting raw descriptor values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HidError {
    /// Device class code not present in the USB class table
    #[error("Unknown USB class code: {0:#04x}")]
    UnknownClass(u8),
}

/// Type alias for HID results
pub type Result<T> = std::result::Result<T, HidError>;
