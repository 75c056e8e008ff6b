//! Port listing command.

use {
    crate::serial::{discover_ports, port_label},
    anyhow::Result,
    console::style,
    nexflash::{BridgeKind, PortInfo},
};

/// JSON entry of one port.
fn port_json(port: &PortInfo) -> serde_json::Value {
    let bridge = BridgeKind::of(port);
    serde_json::json!({
        "name": port.name,
        "bridge": bridge.name(),
        "known": bridge.is_known(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = discover_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(port_json).collect();
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        eprintln!("  {} {}", style("•").green(), port_label(port));
    }

    if let Some(bridge) = detected.iter().find(|p| BridgeKind::of(p).is_known()) {
        eprintln!(
            "\n{} Likely display adapter: {}",
            style("→").green().bold(),
            style(&bridge.name).cyan().bold()
        );
    }

    Ok(())
}
