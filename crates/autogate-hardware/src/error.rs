//! Error types for hardware operations.
//!
//! Device-level failures, classified into transient faults (worth a retry or
//! a reinit) and everything else. Conversion into [`autogate_core::Error`]
//! keeps that classification.

use autogate_core::TransientFault;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The device did not acknowledge a frame.
    #[error("Did not receive expected ACK from {device}")]
    Nack { device: String },

    /// A response frame started with the wrong preamble.
    #[error("Response frame preamble from {device} does not contain 0x00FF")]
    BadPreamble { device: String },

    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Bus-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn nack(device: impl Into<String>) -> Self {
        Self::Nack {
            device: device.into(),
        }
    }

    pub fn bad_preamble(device: impl Into<String>) -> Self {
        Self::BadPreamble {
            device: device.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}

impl TransientFault for HardwareError {
    /// NACKs, garbled frames and bus I/O errors clear up after a retry or a
    /// device reset.
    fn is_transient(&self) -> bool {
        matches!(self, Self::Nack { .. } | Self::BadPreamble { .. } | Self::Io(_))
    }
}

impl From<HardwareError> for autogate_core::Error {
    fn from(error: HardwareError) -> Self {
        if error.is_transient() {
            Self::transient(error)
        } else {
            Self::fatal(1, error)
        }
    }
}
