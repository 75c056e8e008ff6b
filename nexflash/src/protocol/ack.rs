//! Acknowledgments of the firmware update sub-protocol.
//!
//! Two revisions exist, selected by the update command that opens the
//! session:
//!
//! | Format   | Command     | Section reply                                   |
//! |----------|-------------|-------------------------------------------------|
//! | `Legacy` | `whmi-wri`  | `0x05`                                          |
//! | `Skip`   | `whmi-wris` | `0x05`, or `0x08` + LE `u32` absolute offset    |
//!
//! With the skip format the display may ask for any section, including one
//! it already received. An offset of zero means "carry on".

use crate::error::{Error, Result};
use crate::protocol::SECTION_SIZE;
use byteorder::{ByteOrder, LittleEndian};

/// Generic acknowledgment byte.
pub const ACK: u8 = 0x05;

/// Marker of a skip reply, followed by a 4-byte offset.
pub const SKIP: u8 = 0x08;

/// Longest acknowledgment of either format.
pub const MAX_REPLY_LEN: usize = 5;

/// Revision of the acknowledgment sub-format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckFormat {
    /// `whmi-wri`: every section is answered with a bare ack.
    Legacy,
    /// `whmi-wris`: the display may redirect the transfer.
    #[default]
    Skip,
}

impl AckFormat {
    /// Look up a format by name (`legacy`/`v1.0`, `skip`/`v1.1`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "legacy" | "v1.0" | "whmi-wri" => Some(Self::Legacy),
            "skip" | "v1.1" | "whmi-wris" => Some(Self::Skip),
            _ => None,
        }
    }

    /// Text of the update command for this format.
    pub fn prepare_command(self, file_size: u32, baud_rate: u32) -> String {
        match self {
            Self::Legacy => format!("whmi-wri {file_size},{baud_rate},0"),
            Self::Skip => format!("whmi-wris {file_size},{baud_rate},1"),
        }
    }

    /// Total reply length announced by its first byte.
    pub fn reply_len(self, first: u8) -> usize {
        match (self, first) {
            (Self::Skip, SKIP) => MAX_REPLY_LEN,
            _ => 1,
        }
    }

    /// Decode a section reply into the index the display expects next.
    pub fn decode(self, reply: &[u8], section: u32) -> Result<u32> {
        let Some(&first) = reply.first() else {
            return Err(Error::Timeout(format!(
                "no acknowledgment for section {section}"
            )));
        };

        match (self, first) {
            (_, ACK) => Ok(section + 1),
            (Self::Skip, SKIP) => {
                if reply.len() < MAX_REPLY_LEN {
                    return Err(Error::ShortRead {
                        expected: MAX_REPLY_LEN,
                        actual: reply.len(),
                    });
                }
                let offset = LittleEndian::read_u32(&reply[1..MAX_REPLY_LEN]);
                if offset == 0 {
                    Ok(section + 1)
                } else {
                    Ok(offset / SECTION_SIZE)
                }
            },
            (_, other) => Err(Error::Protocol(format!(
                "unexpected acknowledgment 0x{other:02X} for section {section}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ack_advances() {
        assert_eq!(AckFormat::Skip.decode(&[ACK], 0).unwrap(), 1);
        assert_eq!(AckFormat::Legacy.decode(&[ACK], 7).unwrap(), 8);
    }

    #[test]
    fn test_skip_reply_redirects() {
        let reply = [SKIP, 0x00, 0x20, 0x00, 0x00]; // offset 8192
        assert_eq!(AckFormat::Skip.decode(&reply, 5).unwrap(), 2);
    }

    #[test]
    fn test_skip_reply_zero_offset_advances() {
        let reply = [SKIP, 0, 0, 0, 0];
        assert_eq!(AckFormat::Skip.decode(&reply, 3).unwrap(), 4);
    }

    #[test]
    fn test_truncated_skip_reply() {
        let err = AckFormat::Skip.decode(&[SKIP, 0x00], 0).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                expected: 5,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_legacy_rejects_skip_marker() {
        assert!(matches!(
            AckFormat::Legacy.decode(&[SKIP], 0),
            Err(Error::Protocol(_))
        ));
        assert_eq!(AckFormat::Legacy.reply_len(SKIP), 1);
        assert_eq!(AckFormat::Skip.reply_len(SKIP), MAX_REPLY_LEN);
    }

    #[test]
    fn test_empty_reply_is_timeout() {
        assert!(AckFormat::Skip.decode(&[], 0).unwrap_err().is_timeout());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(AckFormat::from_name("LEGACY"), Some(AckFormat::Legacy));
        assert_eq!(AckFormat::from_name("v1.1"), Some(AckFormat::Skip));
        assert_eq!(AckFormat::from_name("v2"), None);
    }
}
