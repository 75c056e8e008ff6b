//! Wire protocol of the display's serial interface.
//!
//! Text commands are ASCII, optionally preceded by a `0x00` null head and
//! normally closed by three `0xFF` bytes:
//!
//! ```text
//! +-----------+---------------------+----------------+
//! | null head |    command text     |      tail      |
//! +-----------+---------------------+----------------+
//! |  0x00 (?) | "get sleep"         | 0xFF 0xFF 0xFF |
//! +-----------+---------------------+----------------+
//! ```
//!
//! Once the display has accepted the firmware update command, the link
//! carries raw image sections of [`SECTION_SIZE`] bytes, each answered by a
//! short binary acknowledgment (see [`ack`]).

use std::time::Duration;

pub mod ack;
pub mod command;
pub mod response;

pub use ack::AckFormat;
pub use command::{Command, send_command};
pub use response::{Terminator, recv_ret_for_update, recv_ret_string};

/// Budget for every response wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Transfer unit of the firmware update mode.
pub const SECTION_SIZE: u32 = 4096;
