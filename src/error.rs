//! Error types for the DirtyJTAG SPI programmer

use std::fmt;

/// Result type for DirtyJTAG operations
pub type Result<T> = std::result::Result<T, DirtyJtagError>;

/// Errors that can occur when using the DirtyJTAG SPI programmer
#[derive(Debug)]
pub enum DirtyJtagError {
    /// Device not found
    DeviceNotFound,
    /// Failed to open device
    OpenFailed(String),
    /// Failed to claim interface
    ClaimFailed(String),
    /// USB transfer failed
    TransferFailed(String),
    /// A bulk transfer moved fewer or more bytes than requested
    ShortTransfer {
        /// Which transfer direction failed ("send" or "receive")
        op: &'static str,
        /// Number of bytes requested
        expected: usize,
        /// Number of bytes actually moved
        actual: usize,
    },
    /// Frequency option could not be parsed or is out of range
    InvalidFrequency(String),
    /// Probe reported a protocol version other than DJTAG1
    UnsupportedProtocol(String),
    /// Invalid parameter
    InvalidParameter(String),
}

impl fmt::Display for DirtyJtagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirtyJtagError::DeviceNotFound => {
                write!(f, "DirtyJTAG probe not found (VID:1209, PID:C0CA)")
            }
            DirtyJtagError::OpenFailed(msg) => {
                write!(f, "Failed to open DirtyJTAG probe: {}", msg)
            }
            DirtyJtagError::ClaimFailed(msg) => write!(f, "Failed to claim interface: {}", msg),
            DirtyJtagError::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            DirtyJtagError::ShortTransfer {
                op,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Short USB {}: {} of {} bytes transferred",
                    op, actual, expected
                )
            }
            DirtyJtagError::InvalidFrequency(msg) => write!(f, "Invalid frequency: {}", msg),
            DirtyJtagError::UnsupportedProtocol(ident) => {
                write!(f, "Unsupported probe protocol \"{}\" (only DJTAG1)", ident)
            }
            DirtyJtagError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for DirtyJtagError {}

impl From<nusb::Error> for DirtyJtagError {
    fn from(e: nusb::Error) -> Self {
        DirtyJtagError::TransferFailed(e.to_string())
    }
}
