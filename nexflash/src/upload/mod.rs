//! Firmware upload session.
//!
//! [`NexUpload`] borrows an open [`Port`] for one session and drives the
//! whole update:
//!
//! 1. Negotiation (echo test, sleep/dim normalization, running mode,
//!    update command with baud rate switch), see [`NexUpload::begin`].
//! 2. Section transfer: each [`SECTION_SIZE`] chunk is written raw and
//!    acknowledged before the next one goes out.
//! 3. Finalization: soft reset and restoring the idle baud rate, see
//!    [`NexUpload::end`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use nexflash::{NativePort, NexUpload};
//! use std::fs::File;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut port = NativePort::open_simple("/dev/ttyUSB0", 9600)?;
//!     let file = File::open("display.tft")?;
//!     let size = u32::try_from(file.metadata()?.len())?;
//!
//!     let mut upload = NexUpload::new(&mut port, 115200, size);
//!     upload.set_update_progress_callback(|percent: u8| println!("{percent}%"));
//!     upload.upload_stream(file)?;
//!     upload.end()?;
//!     Ok(())
//! }
//! ```

mod negotiate;
pub mod progress;
pub mod source;
mod transfer;

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{AckFormat, Command, DEFAULT_TIMEOUT, SECTION_SIZE, send_command};
use log::{debug, info, warn};
use std::io::{Read, Seek};
use std::time::Duration;

pub use negotiate::ECHO_TEST_INPUT;
pub use progress::{ProgressObserver, progress_percent};
pub use source::{FetchSource, FirmwareSource, ForwardSource, StreamSource};
pub use transfer::{section_len, section_total};

/// Maximum number of extra attempts for a section whose ack timed out.
const MAX_SECTION_RETRIES: u32 = 3;

/// Tunables of an upload session.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Budget of every response wait.
    pub timeout: Duration,
    /// Extra attempts for a section whose acknowledgment timed out.
    pub max_section_retries: u32,
    /// Acknowledgment revision (and update command) to use.
    pub ack_format: AckFormat,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_section_retries: MAX_SECTION_RETRIES,
            ack_format: AckFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Nothing sent yet, or finalized by `end()`.
    Idle,
    /// Negotiation started but did not finish.
    Opened,
    /// Display accepted the update command.
    Connected,
}

/// Firmware upload session over a borrowed port.
pub struct NexUpload<'a, P: Port + ?Sized> {
    port: &'a mut P,
    config: UploadConfig,
    baudrate: u32,
    file_size: u32,
    file_section_total: u32,
    idle_baud: Option<u32>,
    state: SessionState,
    sections_acked: u32,
    progress: Option<Box<dyn ProgressObserver + 'a>>,
}

impl<'a, P: Port + ?Sized> NexUpload<'a, P> {
    /// Create a session uploading `file_size` bytes at `baudrate`.
    ///
    /// The port must be open at the display's current (idle) baud rate.
    pub fn new(port: &'a mut P, baudrate: u32, file_size: u32) -> Self {
        Self {
            port,
            config: UploadConfig::default(),
            baudrate,
            file_size,
            file_section_total: section_total(file_size),
            idle_baud: None,
            state: SessionState::Idle,
            sections_acked: 0,
            progress: None,
        }
    }

    /// Replace the session tunables.
    #[must_use]
    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the observer notified after every acknowledged section.
    pub fn set_update_progress_callback(&mut self, observer: impl ProgressObserver + 'a) {
        self.progress = Some(Box::new(observer));
    }

    /// Transfer-phase baud rate.
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Image size in bytes.
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Number of sections the image is split into.
    pub fn file_section_total(&self) -> u32 {
        self.file_section_total
    }

    /// Sections acknowledged in this session.
    pub fn sections_acked(&self) -> u32 {
        self.sections_acked
    }

    /// Whether the display is in update mode for this session.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Session tunables.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Bring the display into update mode.
    ///
    /// Does nothing when already connected. On failure the port is put
    /// back at the idle baud rate and the session stays open, so
    /// [`end`](Self::end) can still reset the display and calling `begin`
    /// again restarts the negotiation.
    pub fn begin(&mut self) -> Result<()> {
        if self.state == SessionState::Connected {
            return Ok(());
        }
        if self.file_size == 0 {
            return Err(Error::InvalidImage("firmware image is empty".into()));
        }

        match self.idle_baud {
            None => self.idle_baud = Some(self.port.baud_rate()),
            // A previous attempt may have died after the baud switch
            Some(_) => self.restore_idle_baud()?,
        }
        self.state = SessionState::Opened;

        if let Err(e) = self.connect() {
            if let Err(restore) = self.restore_idle_baud() {
                warn!("Could not restore idle baud rate: {restore}");
            }
            return Err(e);
        }
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Put the port back at the rate the display listened on before `begin`.
    fn restore_idle_baud(&mut self) -> Result<()> {
        match self.idle_baud {
            Some(baud) if baud != self.port.baud_rate() => {
                debug!("Restoring idle baud rate {baud}");
                self.port.set_baud_rate(baud)
            },
            _ => Ok(()),
        }
    }

    /// Upload the whole image from `source`.
    ///
    /// Negotiates first when needed. The display may redirect the transfer
    /// to another section; `source` is realigned before the next fetch.
    pub fn upload<S: FirmwareSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        self.begin()?;

        info!(
            "Uploading {} bytes in {} sections at {} baud",
            self.file_size, self.file_section_total, self.baudrate
        );

        let mut buf = vec![0u8; SECTION_SIZE as usize];
        let mut section = 0;
        while section < self.file_section_total {
            let len = section_len(self.file_size, section);
            let chunk = &mut buf[..len];

            let produced = source.fetch_section(section, chunk)?;
            if produced != len {
                return Err(Error::ShortRead {
                    expected: len,
                    actual: produced,
                });
            }

            let next = self.upload_section_with_retry(section, &buf[..len])?;
            if next > self.file_section_total {
                return Err(Error::Desync(format!(
                    "display asked for section {next} of {}",
                    self.file_section_total
                )));
            }
            // Nothing left to realign for once the display is satisfied
            if next != section + 1 && next < self.file_section_total {
                debug!("Display redirected transfer from section {section} to {next}");
                source.skip_to_section(section + 1, next)?;
            }
            section = next;
        }

        info!("Upload complete");
        Ok(())
    }

    /// Upload from a seekable stream positioned at the start of the image.
    pub fn upload_stream<R: Read + Seek>(&mut self, reader: R) -> Result<()> {
        self.upload(&mut StreamSource::new(reader))
    }

    /// Upload sections produced by `fetcher(section, buf)`.
    pub fn upload_with<F>(&mut self, fetcher: F) -> Result<()>
    where
        F: FnMut(u32, &mut [u8]) -> Result<usize>,
    {
        self.upload(&mut FetchSource::new(fetcher))
    }

    /// Send a section, resending it while its acknowledgment times out.
    fn upload_section_with_retry(&mut self, section: u32, data: &[u8]) -> Result<u32> {
        let mut attempt = 0;
        loop {
            match self.upload_section(section, data) {
                Err(e) if e.is_timeout() && attempt < self.config.max_section_retries => {
                    attempt += 1;
                    warn!(
                        "Section {section} not acknowledged (retry {attempt}/{}): {e}",
                        self.config.max_section_retries
                    );
                },
                result => return result,
            }
        }
    }

    /// Send the reset command. The display does not answer.
    pub fn soft_reset(&mut self) -> Result<()> {
        info!("Resetting display...");
        send_command(&mut *self.port, &Command::reset())
    }

    /// Finish the session.
    ///
    /// Resets the display and restores the idle baud rate when a session was
    /// opened, then clears the session counters. Safe to call repeatedly and
    /// without a prior [`begin`](Self::begin); in that case nothing is sent.
    pub fn end(&mut self) -> Result<()> {
        let result = if self.state == SessionState::Idle {
            Ok(())
        } else {
            let reset = self.soft_reset();
            let restore = self.restore_idle_baud();
            reset.and(restore)
        };

        self.state = SessionState::Idle;
        self.idle_baud = None;
        self.sections_acked = 0;
        result
    }

    /// Release the port.
    pub fn into_port(self) -> &'a mut P {
        self.port
    }
}
