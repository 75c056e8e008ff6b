//! Error types for nexflash.

use std::io;
use thiserror::Error;

/// Result type for nexflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for nexflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, firmware file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No response within the read budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No display answered on any probed baud rate.
    #[error("Display not found")]
    DeviceNotFound,

    /// Handshake failed (echo mismatch, unexpected reply, missing ack).
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The port accepted fewer bytes than requested.
    #[error("Short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        /// Bytes requested.
        expected: usize,
        /// Bytes accepted.
        actual: usize,
    },

    /// Fewer bytes were read than the reply or section requires.
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes required.
        expected: usize,
        /// Bytes obtained.
        actual: usize,
    },

    /// The display requested a section the firmware source cannot reach.
    #[error("Protocol desync: {0}")]
    Desync(String),

    /// Unrecognised reply from the display.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Firmware image unusable for an upload session.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error is a read timeout, the only error the section
    /// retry loop treats as transient.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_read_message() {
        let err = Error::ShortRead {
            expected: 5,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Short read: expected 5 bytes, got 2");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::Timeout("ack".into()).is_timeout());
        assert!(!Error::HandshakeFailed("echo".into()).is_timeout());
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
