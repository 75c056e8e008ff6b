//! Display identification command.

use {
    super::{identify, open_display},
    crate::{Cli, config::Config},
    anyhow::Result,
    console::style,
    nexflash::{DeviceInfo, Port, SECTION_SIZE},
};

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let mut conn = open_display(cli, config)?;
    let identified = identify(&mut conn);
    let _ = conn.port.close();
    let (baud, device) = identified?;

    if json {
        let output = serde_json::json!({
            "port": conn.name,
            "baud": baud,
            "device": device,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in describe(&conn.name, baud, &device) {
        eprintln!("{line}");
    }
    Ok(())
}

/// Human-readable description of an identified display.
fn describe(port: &str, baud: u32, device: &DeviceInfo) -> Vec<String> {
    let max_sections = device.flash_size / SECTION_SIZE;
    vec![
        format!("{}", style("Display").bold().underlined()),
        format!("  Model:            {}", style(&device.model).cyan().bold()),
        format!(
            "  Touch:            {}",
            if device.touch { "yes" } else { "no" }
        ),
        format!("  Firmware version: {}", device.firmware_version),
        format!("  MCU code:         {}", device.mcu_code),
        format!("  Serial number:    {}", device.serial),
        format!(
            "  Flash size:       {} bytes ({max_sections} sections)",
            device.flash_size
        ),
        format!("  Port:             {port} @ {baud} baud"),
    ]
}
