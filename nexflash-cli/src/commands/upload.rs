//! Firmware upload command.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use nexflash::upload::section_total;
use nexflash::{AckFormat, DEFAULT_TIMEOUT, NexUpload, Port, UploadConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use super::{identify, open_display};
use crate::config::Config;
use crate::{BaudSetting, Cli, CliError, use_fancy_output};

/// Transfer baud rate when neither flag nor config sets one.
pub(crate) const DEFAULT_UPLOAD_BAUD: u32 = 115200;

/// Per-invocation upload settings from the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct UploadOptions {
    pub upload_baud: Option<u32>,
    pub legacy: bool,
    pub retries: Option<u32>,
    pub timeout_ms: Option<u64>,
}

/// Combine flags and config into session settings, flags first.
fn session_settings(options: &UploadOptions, config: &Config) -> (u32, UploadConfig) {
    let baud = options
        .upload_baud
        .or(config.upload.baud)
        .unwrap_or(DEFAULT_UPLOAD_BAUD);

    let defaults = UploadConfig::default();
    let session = UploadConfig {
        timeout: options
            .timeout_ms
            .or(config.upload.timeout_ms)
            .map_or(DEFAULT_TIMEOUT, Duration::from_millis),
        max_section_retries: options
            .retries
            .or(config.upload.retries)
            .unwrap_or(defaults.max_section_retries),
        ack_format: if options.legacy || config.upload.legacy == Some(true) {
            AckFormat::Legacy
        } else {
            AckFormat::Skip
        },
    };
    (baud, session)
}

/// Size of the firmware file as the protocol expects it.
fn firmware_size(file: &File, path: &Path) -> Result<u32> {
    let len = file
        .metadata()
        .with_context(|| format!("failed to read metadata of {}", path.display()))?
        .len();
    match u32::try_from(len) {
        Ok(0) => Err(CliError::Usage(format!("firmware file {} is empty", path.display())).into()),
        Ok(size) => Ok(size),
        Err(_) => Err(CliError::Usage(format!(
            "firmware file {} is too large ({len} bytes)",
            path.display()
        ))
        .into()),
    }
}

/// Upload command implementation.
pub(crate) fn cmd_upload(
    cli: &Cli,
    config: &mut Config,
    firmware: &Path,
    options: &UploadOptions,
) -> Result<()> {
    let file = File::open(firmware)
        .with_context(|| format!("failed to open firmware {}", firmware.display()))?;
    let file_size = firmware_size(&file, firmware)?;
    if !firmware
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tft"))
    {
        warn!("{} does not have a .tft extension", firmware.display());
    }

    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes, {} sections)",
            style("📦").cyan(),
            firmware.display(),
            file_size,
            section_total(file_size)
        );
    }

    let (upload_baud, session) = session_settings(options, config);
    let mut conn = open_display(cli, config)?;

    // Identification is required to find the baud rate, optional otherwise
    match identify(&mut conn) {
        Ok((baud, device)) => {
            if !cli.quiet {
                eprintln!(
                    "{} Found {} on {} at {} baud",
                    style("🔌").cyan(),
                    style(&device.model).bold(),
                    conn.name,
                    baud
                );
            }
            if file_size > device.flash_size {
                warn!(
                    "Firmware ({file_size} bytes) is larger than the display's flash ({} bytes)",
                    device.flash_size
                );
            }
        },
        Err(e) if conn.baud == BaudSetting::Auto => return Err(e),
        Err(e) => warn!("Could not identify display, trying anyway: {e:#}"),
    }

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };
    pb.set_message(format!("at {upload_baud} baud"));

    let result = {
        let mut upload = NexUpload::new(&mut conn.port, upload_baud, file_size).with_config(session);
        upload.set_update_progress_callback(|percent: u8| pb.set_position(u64::from(percent)));

        let transfer = upload.upload_stream(BufReader::new(file));
        // Reset the display even when the transfer failed
        let end = upload.end();
        transfer.and(end)
    };

    if let Err(e) = result {
        pb.abandon();
        let _ = conn.port.close();
        return Err(e).context("upload failed");
    }

    pb.finish_with_message("complete");
    conn.port.close()?;

    if !cli.quiet {
        eprintln!("\n{} Upload completed", style("🎉").green().bold());
    }

    Ok(())
}
