//! # nexflash
//!
//! A library for uploading TFT firmware to Nextion HMI displays.
//!
//! This crate implements the display's serial update protocol:
//!
//! - Text command framing and reply parsing
//! - Handshake into firmware update mode (echo test, sleep/dim, baud switch)
//! - Section transfer with acknowledgments, redirects and retries
//! - Display identification and baud rate discovery
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use nexflash::{NexUpload, Port};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut port = nexflash::NativePort::open_simple("/dev/ttyUSB0", 9600)?;
//!         let image = std::fs::read("display.tft")?;
//!
//!         let mut upload = NexUpload::new(&mut port, 921600, u32::try_from(image.len())?);
//!         upload.set_update_progress_callback(|percent: u8| println!("{percent}%"));
//!         upload.upload_stream(std::io::Cursor::new(image))?;
//!         upload.end()?;
//!         drop(upload);
//!
//!         port.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod upload;

#[cfg(test)]
mod test_util;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    device::{BridgeKind, DeviceInfo, SUPPORTED_BAUD_RATES, detect_baud_rate, probe},
    error::{Error, Result},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{AckFormat, Command, DEFAULT_TIMEOUT, SECTION_SIZE},
    upload::{
        FetchSource, FirmwareSource, ForwardSource, NexUpload, ProgressObserver, StreamSource,
        UploadConfig,
    },
};
