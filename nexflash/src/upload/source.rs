//! Firmware source adapters.
//!
//! The upload loop asks a [`FirmwareSource`] for one section at a time and
//! tells it when the display redirects the transfer. Whether the bytes come
//! from a file, a socket or memory is the caller's business.

use crate::error::{Error, Result};
use crate::protocol::SECTION_SIZE;
use log::debug;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

/// Provider of firmware sections.
pub trait FirmwareSource {
    /// Fill `buf` with section `section` and return the bytes produced.
    ///
    /// `buf` is exactly the section's length; fewer bytes than that is
    /// only acceptable at end of input.
    fn fetch_section(&mut self, section: u32, buf: &mut [u8]) -> Result<usize>;

    /// Realign before the next fetch: the cursor sits at section `from`
    /// but the display wants `to`.
    fn skip_to_section(&mut self, from: u32, to: u32) -> Result<()> {
        let _ = (from, to);
        Ok(())
    }
}

/// Read until `buf` is full or the reader hits end of input.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

fn section_offset(section: u32) -> u64 {
    u64::from(section) * u64::from(SECTION_SIZE)
}

/// Sequential reader over a seekable stream (file, in-memory cursor).
///
/// Sections are read in order; a redirect seeks the stream to the start of
/// the requested section.
pub struct StreamSource<R> {
    reader: R,
}

impl<R: Read + Seek> StreamSource<R> {
    /// Wrap a stream positioned at the start of the image.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Give the stream back.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> FirmwareSource for StreamSource<R> {
    fn fetch_section(&mut self, _section: u32, buf: &mut [u8]) -> Result<usize> {
        read_full(&mut self.reader, buf)
    }

    fn skip_to_section(&mut self, from: u32, to: u32) -> Result<()> {
        if from == to {
            return Ok(());
        }
        debug!("Seeking firmware stream from section {from} to {to}");
        self.reader
            .seek(SeekFrom::Start(section_offset(to)))?;
        Ok(())
    }
}

/// Sequential reader over a stream that cannot seek (pipe, socket).
///
/// Forward redirects discard bytes; a request for a section already
/// consumed cannot be served and ends the upload.
pub struct ForwardSource<R> {
    reader: R,
}

impl<R: Read> ForwardSource<R> {
    /// Wrap a stream positioned at the start of the image.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> FirmwareSource for ForwardSource<R> {
    fn fetch_section(&mut self, _section: u32, buf: &mut [u8]) -> Result<usize> {
        read_full(&mut self.reader, buf)
    }

    fn skip_to_section(&mut self, from: u32, to: u32) -> Result<()> {
        if to < from {
            return Err(Error::Desync(format!(
                "display asked for section {to}, stream already at section {from}"
            )));
        }
        let skip = section_offset(to) - section_offset(from);
        let skipped = io::copy(&mut (&mut self.reader).take(skip), &mut io::sink())?;
        if skipped < skip {
            return Err(Error::Desync(format!(
                "stream ended while skipping to section {to}"
            )));
        }
        Ok(())
    }
}

/// Index-based fetcher: any `FnMut(section, buf) -> Result<usize>`.
pub struct FetchSource<F> {
    fetch: F,
}

impl<F> FetchSource<F>
where
    F: FnMut(u32, &mut [u8]) -> Result<usize>,
{
    /// Wrap a fetch function.
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> FirmwareSource for FetchSource<F>
where
    F: FnMut(u32, &mut [u8]) -> Result<usize>,
{
    fn fetch_section(&mut self, section: u32, buf: &mut [u8]) -> Result<usize> {
        (self.fetch)(section, buf)
    }
}
