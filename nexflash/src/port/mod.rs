//! Port abstraction for the serial link to the display.
//!
//! The upload engine only talks to the [`Port`] trait, so the protocol
//! layer stays independent of the actual serial implementation:
//!
//! ```text
//! +------------------------------+
//! |  Upload engine / device probe|
//! +--------------+---------------+
//!                |
//!                v
//! +--------------+---------------+
//! |          Port trait          |
//! +--------------+---------------+
//!                |
//!                v
//! +--------------+---------------+
//! | NativePort (serialport crate)|
//! +------------------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use nexflash::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> nexflash::Result<()> {
//!     port.write_all_bytes(b"get dim\xff\xff\xff")?;
//!     port.set_baud_rate(115200)?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

/// Baud rate a factory-fresh display listens on.
pub const DEFAULT_BAUD: u32 = 9600;

/// Serial port configuration.
///
/// Displays always run 8N1 without flow control, so only the name, speed
/// and per-read timeout are configurable.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout of a single read/write call.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte link to the display.
///
/// The per-call timeout set here only bounds a single `read`; protocol
/// level budgets are enforced by the response parser on top of it.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Clear input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes and flush.
    ///
    /// A port that stops accepting bytes part way through is reported as
    /// [`Error::ShortWrite`] with the count that made it out.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]) {
                Ok(0) => {
                    return Err(Error::ShortWrite {
                        expected: buf.len(),
                        actual: written,
                    });
                },
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
        self.flush()?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;

    /// List only USB serial adapters.
    fn list_usb_ports() -> Result<Vec<PortInfo>> {
        Ok(Self::list_ports()?
            .into_iter()
            .filter(|p| p.vid.is_some())
            .collect())
    }
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
