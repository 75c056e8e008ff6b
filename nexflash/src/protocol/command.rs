//! Text command builder.

use crate::error::Result;
use crate::port::Port;
use crate::protocol::ack::AckFormat;
use log::trace;

/// Byte optionally sent in front of a command.
pub const NULL_HEAD: u8 = 0x00;

/// Command terminator.
pub const TAIL: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Garbage line sent before `connect` to flush the display's parser.
pub const WAKE_UP: &str = "DRAKJHSUYDGBNCJHGJKSHBDN";

/// A text command with its framing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    tail: bool,
    null_head: bool,
}

impl Command {
    /// Create a command terminated with the `0xFF` tail.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tail: true,
            null_head: false,
        }
    }

    /// Send the command without the `0xFF` tail.
    #[must_use]
    pub fn without_tail(mut self) -> Self {
        self.tail = false;
        self
    }

    /// Prefix the command with a single `0x00` byte.
    #[must_use]
    pub fn with_null_head(mut self) -> Self {
        self.null_head = true;
        self
    }

    /// Command text without framing.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// `print "<input>"`: the display writes `input` back verbatim.
    pub fn echo(input: &str) -> Self {
        Self::new(format!("print \"{input}\""))
    }

    /// `get <variable>`: answered by a numeric reply.
    pub fn get(variable: &str) -> Self {
        Self::new(format!("get {variable}"))
    }

    /// `<variable>=<value>` assignment.
    pub fn assign(variable: &str, value: u32) -> Self {
        Self::new(format!("{variable}={value}"))
    }

    /// Undocumented switch into the mode the editor uses for uploads.
    ///
    /// The display never answers it.
    pub fn running_mode() -> Self {
        Self::new("runmod=2")
    }

    /// Firmware update command carrying image size and transfer baud rate.
    pub fn prepare_update(format: AckFormat, file_size: u32, baud_rate: u32) -> Self {
        Self::new(format.prepare_command(file_size, baud_rate))
    }

    /// `rest`: soft reset.
    pub fn reset() -> Self {
        Self::new("rest")
    }

    /// `connect`: answered by a `comok` line describing the display.
    pub fn connect() -> Self {
        Self::new("connect")
    }

    /// Empty command preceded by the null head.
    pub fn null() -> Self {
        Self::new("").with_null_head()
    }

    /// Serialize the command with its framing.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.text.len() + 4);
        if self.null_head {
            data.push(NULL_HEAD);
        }
        data.extend_from_slice(self.text.as_bytes());
        if self.tail {
            data.extend_from_slice(&TAIL);
        }
        data
    }
}

/// Write a command to the port.
pub fn send_command<P: Port + ?Sized>(port: &mut P, cmd: &Command) -> Result<()> {
    let data = cmd.build();
    trace!("Sending command {:?}: {} bytes", cmd.text(), data.len());
    port.write_all_bytes(&data)
}
