//! Soft reset command.

use anyhow::Result;
use console::style;
use log::{info, warn};
use nexflash::Port;
use nexflash::protocol::{Command, send_command};

use super::{identify, open_display};
use crate::config::Config;
use crate::{BaudSetting, Cli};

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut conn = open_display(cli, config)?;

    match identify(&mut conn) {
        Ok((baud, device)) => {
            info!("Resetting {} at {baud} baud", device.model);
        },
        Err(e) if conn.baud == BaudSetting::Auto => return Err(e),
        Err(e) => warn!("Could not identify display, sending reset anyway: {e:#}"),
    }

    send_command(&mut conn.port, &Command::reset())?;
    conn.port.close()?;

    if !cli.quiet {
        eprintln!("{} Reset sent to {}", style("✓").green(), conn.name);
    }
    Ok(())
}
