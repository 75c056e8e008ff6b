//! Interactive serial port selection.
//!
//! Supports:
//! - Auto-detection of known USB-UART bridges
//! - Interactive selection via dialoguer
//! - Remembering selected ports in configuration
//! - Non-interactive mode for CI/CD

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info, warn},
    nexflash::{BridgeKind, NativePortEnumerator, PortEnumerator, PortInfo},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// List all ports (including unknown types).
    pub list_all_ports: bool,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
    /// Force confirmation even for single recognized port.
    pub confirm_port: bool,
}

/// Result of port selection including whether it was a known device.
pub struct SelectedPort {
    /// The selected port info.
    pub port: PortInfo,
    /// Whether this port matched a known/configured device.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Enumerate ports, treating enumeration failures as "no ports".
pub fn discover_ports() -> Vec<PortInfo> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

fn select_non_interactive_port(
    selection_ports: Vec<PortInfo>,
    config: &Config,
) -> Result<SelectedPort> {
    // Exactly one candidate is the only deterministic choice
    let mut ports = selection_ports.into_iter();
    match (ports.next(), ports.next()) {
        (Some(port), None) => Ok(SelectedPort {
            is_known: is_known_device(&port, config),
            port,
        }),
        (Some(_), Some(_)) => Err(usage_err(
            "multiple serial ports found; pass --port to choose one",
        )),
        (None, _) => Err(usage_err("no serial port available; pass --port")),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    // If port explicitly specified, use it
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    // If port in config, use it
    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    let ports = discover_ports();
    if ports.is_empty() {
        return Err(usage_err("no serial ports found"));
    }

    // Known bridges first unless the user asks for all
    let known_ports: Vec<PortInfo> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();
    let selection_ports = if options.list_all_ports || known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return select_non_interactive_port(selection_ports, config);
    }

    match selection_ports.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(selection_ports, config)
        },
        Ordering::Equal => {
            let mut ports = selection_ports;
            let port = ports.remove(0);
            let is_known = is_known_device(&port, config);

            if is_known && !options.confirm_port {
                info!(
                    "Auto-selected port: {} [{}]",
                    port.name,
                    BridgeKind::of(&port).name()
                );
                Ok(SelectedPort { port, is_known })
            } else {
                ensure_interactive_terminal()?;
                confirm_single_port(port)
            }
        },
        Ordering::Less => Err(usage_err("no serial port available; pass --port")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                usage_err(&format!("port prompt failed: {io_err}"))
            }
        },
    }
}

/// Find a port by name, falling back to a bare entry for unlisted paths.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = discover_ports();

    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));
    if let Some(port) = found {
        return SelectedPort {
            port: port.clone(),
            is_known: BridgeKind::of(port).is_known(),
        };
    }

    SelectedPort {
        port: PortInfo {
            name: name.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        },
        is_known: false,
    }
}

/// Check if a port matches a known bridge or a remembered device.
fn is_known_device(port: &PortInfo, config: &Config) -> bool {
    if BridgeKind::of(port).is_known() {
        return true;
    }
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config.knows_usb_device(vid, pid),
        _ => false,
    }
}

/// One-line label of a port for prompts and listings.
pub fn port_label(port: &PortInfo) -> String {
    let bridge = BridgeKind::of(port);
    let device_info = if bridge.is_known() {
        format!(" [{}]", style(bridge.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };

    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{}{device_info}{product}", port.name)
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<PortInfo>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    ports.sort_by_key(|p| !is_known_device(p, config));

    // Truncate labels so narrow terminals do not wrap them
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|port| {
            let label = port_label(port);
            console::truncate_str(&label, max_item_width, "\u{2026}").into_owned()
        })
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the display's serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
            let is_known = is_known_device(&port, config);
            Ok(SelectedPort { port, is_known })
        },
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: PortInfo) -> Result<SelectedPort> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}?", port_label(&port)))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        Err(CliError::Cancelled("port selection cancelled".to_string()).into())
    }
}

/// Ask user if they want to remember this port.
pub fn ask_remember_port(port: &PortInfo, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.knows_usb_device(vid, pid) || ensure_interactive_terminal().is_err() {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this device for automatic selection?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UsbDevice;

    fn port(name: &str, vid: Option<u16>, pid: Option<u16>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid,
            pid,
            manufacturer: None,
            product: None,
        }
    }

    fn assert_usage_error(err: &anyhow::Error) {
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_serial_options_default() {
        let options = SerialOptions::default();
        assert!(options.port.is_none());
        assert!(!options.list_all_ports);
        assert!(!options.non_interactive);
        assert!(!options.confirm_port);
    }

    #[test]
    fn test_is_known_device_builtin() {
        let p = port("/dev/ttyUSB0", Some(0x1A86), Some(0x7523));
        assert!(is_known_device(&p, &Config::default()));
    }

    #[test]
    fn test_is_known_device_unknown() {
        let p = port("/dev/ttyUSB0", Some(0x9999), Some(0x9999));
        assert!(!is_known_device(&p, &Config::default()));
        assert!(!is_known_device(&port("/dev/ttyS0", None, None), &Config::default()));
    }

    #[test]
    fn test_is_known_device_from_config() {
        let p = port("/dev/ttyUSB0", Some(0xABCD), Some(0x1234));
        let mut config = Config::default();
        config.usb_device.push(UsbDevice {
            vid: 0xABCD,
            pid: 0x1234,
        });
        assert!(is_known_device(&p, &config));
    }

    #[test]
    fn test_explicit_unlisted_port_is_kept() {
        let selected = find_port_by_name("INVALID_PORT_NAME_XYZ");
        assert_eq!(selected.port.name, "INVALID_PORT_NAME_XYZ");
        assert!(!selected.is_known);
    }

    #[test]
    fn test_select_non_interactive_multiple_ports_returns_usage_error() {
        let ports = vec![
            port("/dev/ttyUSB0", None, None),
            port("/dev/ttyUSB1", None, None),
        ];
        let err = select_non_interactive_port(ports, &Config::default())
            .err()
            .expect("expected error");
        assert_usage_error(&err);
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn test_select_non_interactive_no_ports_returns_usage_error() {
        let err = select_non_interactive_port(vec![], &Config::default())
            .err()
            .expect("expected error");
        assert_usage_error(&err);
    }

    #[test]
    fn test_select_non_interactive_single_port() {
        let ports = vec![port("/dev/ttyUSB0", Some(0x10C4), Some(0xEA60))];
        let selected = select_non_interactive_port(ports, &Config::default()).unwrap();
        assert_eq!(selected.port.name, "/dev/ttyUSB0");
        assert!(selected.is_known);
    }

    #[test]
    fn test_port_label() {
        console::set_colors_enabled(false);
        let mut p = port("/dev/ttyUSB0", Some(0x1A86), Some(0x7523));
        p.product = Some("USB Serial".to_string());
        assert_eq!(port_label(&p), "/dev/ttyUSB0 [CH340/CH341] - USB Serial");
        assert_eq!(
            port_label(&port("COM4", Some(0x1234), Some(0x00AB))),
            "COM4 (1234:00AB)"
        );
    }
}
