//! Command implementations.
//!
//! Each subcommand is implemented in its own module; opening and identifying
//! the display is shared here.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod ports;
pub(crate) mod reset;
pub(crate) mod upload;

use anyhow::{Context, Result};
use log::debug;
use nexflash::port::DEFAULT_BAUD;
use nexflash::{DeviceInfo, NativePort, SUPPORTED_BAUD_RATES, SerialConfig};
use std::time::Duration;

use crate::config::Config;
use crate::{BaudSetting, Cli, get_port};

/// Wait for a `connect` reply at one baud rate.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_millis(400);

/// An open port to the display.
pub(crate) struct Connection {
    /// Serial port, at the display's idle baud rate once identified.
    pub port: NativePort,
    /// Port name.
    pub name: String,
    /// Requested idle baud rate.
    pub baud: BaudSetting,
}

/// Select and open the port.
pub(crate) fn open_display(cli: &Cli, config: &mut Config) -> Result<Connection> {
    let name = get_port(cli, config)?;
    let baud = cli
        .baud
        .or(config.connection.baud.map(BaudSetting::Rate))
        .unwrap_or(BaudSetting::Rate(DEFAULT_BAUD));

    let initial = match baud {
        BaudSetting::Rate(rate) => rate,
        BaudSetting::Auto => DEFAULT_BAUD,
    };
    debug!("Opening {name} at {initial} baud");
    let port = NativePort::open(&SerialConfig::new(&name, initial))
        .with_context(|| format!("failed to open serial port {name}"))?;

    Ok(Connection { port, name, baud })
}

/// Baud rates to try when searching, the common factory settings first.
pub(crate) fn search_order() -> Vec<u32> {
    let mut rates = vec![DEFAULT_BAUD, 115200];
    rates.extend(
        SUPPORTED_BAUD_RATES
            .iter()
            .rev()
            .filter(|&&rate| rate != DEFAULT_BAUD && rate != 115200),
    );
    rates
}

/// Identify the display, searching the baud rate when asked to.
pub(crate) fn identify(conn: &mut Connection) -> Result<(u32, DeviceInfo)> {
    match conn.baud {
        BaudSetting::Auto => {
            nexflash::detect_baud_rate(&mut conn.port, &search_order(), PROBE_TIMEOUT)
                .with_context(|| format!("no display answered on {}", conn.name))
        },
        BaudSetting::Rate(rate) => match nexflash::probe(&mut conn.port, PROBE_TIMEOUT) {
            Ok(device) => Ok((rate, device)),
            Err(e) if e.is_timeout() => Err(anyhow::Error::from(nexflash::Error::DeviceNotFound)
                .context(format!("no display answered on {} at {rate} baud", conn.name))),
            Err(e) => Err(e.into()),
        },
    }
}
