//! Section transfer.

use super::NexUpload;
use super::progress::progress_percent;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::SECTION_SIZE;
use crate::protocol::ack::MAX_REPLY_LEN;
use crate::protocol::recv_ret_for_update;
use log::{debug, trace};

/// Number of sections needed for an image of `file_size` bytes.
pub fn section_total(file_size: u32) -> u32 {
    file_size.div_ceil(SECTION_SIZE)
}

/// Length of section `section`: full sections except a shorter last one.
///
/// Zero for sections past the end of the image.
#[allow(clippy::cast_possible_truncation)]
pub fn section_len(file_size: u32, section: u32) -> usize {
    let start = u64::from(section) * u64::from(SECTION_SIZE);
    let remaining = u64::from(file_size).saturating_sub(start);
    remaining.min(u64::from(SECTION_SIZE)) as usize
}

impl<P: Port + ?Sized> NexUpload<'_, P> {
    /// Send one section and wait for the display's acknowledgment.
    ///
    /// Returns the index of the section the display wants next. The progress
    /// observer is notified before returning.
    pub fn upload_section(&mut self, section: u32, data: &[u8]) -> Result<u32> {
        if !self.is_connected() {
            return Err(Error::Protocol(
                "section sent before the display entered update mode".into(),
            ));
        }

        trace!("Sending section {section} ({} bytes)", data.len());
        self.port.write_all_bytes(data)?;

        let mut response = [0u8; MAX_REPLY_LEN];
        let count = recv_ret_for_update(
            &mut *self.port,
            self.config.ack_format,
            &mut response,
            self.config.timeout,
        )?;
        let next = self
            .config
            .ack_format
            .decode(&response[..count], section)?;

        self.sections_acked += 1;
        let percent = progress_percent(next, self.file_section_total);
        debug!("Section {section} acknowledged, next {next} ({percent}%)");
        if let Some(observer) = self.progress.as_mut() {
            observer.on_progress(percent);
        }
        Ok(next)
    }
}
