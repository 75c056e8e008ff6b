//! Display identification and baud rate discovery.
//!
//! A display answers `connect` with a `comok` line describing itself:
//!
//! ```text
//! comok 1,30601-0,NX4832T035_011R,163,61488,D264B8204F0E1828,16777216
//!       |    |          |          |    |          |             |
//!     touch reserved  model       fw   mcu       serial       flash
//! ```

use crate::error::{Error, Result};
use crate::port::{Port, PortInfo};
use crate::protocol::command::{TAIL, WAKE_UP};
use crate::protocol::{Command, Terminator, recv_ret_string, send_command};
use log::{debug, info, trace};
use std::time::{Duration, Instant};

/// Baud rates a display can be configured for, slowest first.
pub const SUPPORTED_BAUD_RATES: [u32; 13] = [
    2400, 4800, 9600, 19200, 31250, 38400, 57600, 115200, 230400, 250000, 256000, 512000, 921600,
];

const COMOK_PREFIX: &str = "comok ";

/// Identity reported by a display.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    /// Touch panel present.
    pub touch: bool,
    /// Reserved field, vendor specific.
    pub reserved: String,
    /// Model name (e.g. `NX4832T035_011R`).
    pub model: String,
    /// Firmware version.
    pub firmware_version: u32,
    /// MCU code.
    pub mcu_code: u32,
    /// Serial number.
    pub serial: String,
    /// Flash size in bytes.
    pub flash_size: u32,
}

impl DeviceInfo {
    /// Parse a `comok` reply, with or without the `0xFF` tail.
    pub fn parse(reply: &[u8]) -> Result<Self> {
        let body = reply.strip_suffix(&TAIL).unwrap_or(reply);
        let text = String::from_utf8_lossy(body);
        let invalid = || Error::Protocol(format!("invalid connect reply: {text:?}"));

        let fields: Vec<&str> = text
            .trim()
            .strip_prefix(COMOK_PREFIX)
            .ok_or_else(invalid)?
            .split(',')
            .collect();
        let [touch, reserved, model, fw, mcu, serial, flash] = fields[..] else {
            return Err(invalid());
        };

        let number = |field: &str| field.trim().parse::<u32>().map_err(|_| invalid());
        Ok(Self {
            touch: number(touch)? != 0,
            reserved: reserved.to_string(),
            model: model.to_string(),
            firmware_version: number(fw)?,
            mcu_code: number(mcu)?,
            serial: serial.to_string(),
            flash_size: number(flash)?,
        })
    }
}

/// Identify the display at the port's current baud rate.
pub fn probe<P: Port + ?Sized>(port: &mut P, timeout: Duration) -> Result<DeviceInfo> {
    port.clear_buffers()?;
    send_command(port, &Command::new(WAKE_UP))?;
    send_command(port, &Command::null())?;
    send_command(port, &Command::connect())?;

    // The wake-up string usually draws an error reply first
    let deadline = Instant::now() + timeout;
    loop {
        let budget = deadline.saturating_duration_since(Instant::now());
        let reply = recv_ret_string(port, Terminator::Tail, budget)?;
        if reply.is_empty() {
            return Err(Error::Timeout(format!(
                "no connect reply at {} baud",
                port.baud_rate()
            )));
        }
        if reply.starts_with(COMOK_PREFIX.as_bytes()) {
            return DeviceInfo::parse(&reply);
        }
        trace!("Ignoring reply {reply:02X?}");
        if budget.is_zero() {
            return Err(Error::Timeout("connect reply not received".into()));
        }
    }
}

/// Try each candidate baud rate until the display answers.
///
/// The port is left at the rate that worked.
pub fn detect_baud_rate<P: Port + ?Sized>(
    port: &mut P,
    candidates: &[u32],
    timeout: Duration,
) -> Result<(u32, DeviceInfo)> {
    for &baud in candidates {
        debug!("Probing at {baud} baud");
        port.set_baud_rate(baud)?;
        match probe(port, timeout) {
            Ok(device) => {
                info!("Found {} at {baud} baud", device.model);
                return Ok((baud, device));
            },
            Err(e @ (Error::Timeout(_) | Error::Protocol(_))) => {
                debug!("No display at {baud} baud: {e}");
            },
            Err(e) => return Err(e),
        }
    }
    Err(Error::DeviceNotFound)
}

/// USB-UART bridges commonly wired to displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind {
    /// CH340/CH341.
    Ch340,
    /// Silicon Labs CP210x.
    Cp210x,
    /// FTDI FT232 family.
    Ftdi,
    /// Prolific PL2303.
    Prolific,
    /// Not a known bridge.
    Unknown,
}

/// Known VID/PID pairs. An empty PID list matches any product of the vendor.
const KNOWN_BRIDGES: &[(u16, &[u16], BridgeKind)] = &[
    (0x1A86, &[0x7523, 0x7522, 0x5523, 0x55D4], BridgeKind::Ch340),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71], BridgeKind::Cp210x),
    (0x0403, &[], BridgeKind::Ftdi),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], BridgeKind::Prolific),
];

impl BridgeKind {
    /// Classify a USB port.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_BRIDGES
            .iter()
            .find(|(known_vid, pids, _)| {
                *known_vid == vid && (pids.is_empty() || pids.contains(&pid))
            })
            .map_or(Self::Unknown, |(_, _, kind)| *kind)
    }

    /// Classify a listed port.
    pub fn of(info: &PortInfo) -> Self {
        match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => Self::from_vid_pid(vid, pid),
            _ => Self::Unknown,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this is a recognized bridge.
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}
