//! Reply parsing under a wall-clock budget.
//!
//! Replies are read one byte at a time so a parser never swallows bytes
//! that belong to the next reply. Port-level timeouts are expected while
//! the display is busy and only end the read once the budget is spent.

use crate::error::{Error, Result};
use crate::protocol::ack::{ACK, AckFormat, MAX_REPLY_LEN};
use crate::protocol::command::TAIL;
use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

/// First byte of a numeric reply (`0x71` + LE `u32` + tail).
pub const NUMERIC_REPLY: u8 = 0x71;

/// Pause between polls of a port that returned no data.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// When a text reply is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// After the `0xFF 0xFF 0xFF` tail.
    Tail,
    /// On the first ack byte `0x05`.
    Ack,
    /// After exactly this many bytes.
    Length(usize),
    /// Whatever arrived before the budget ran out.
    Timeout,
}

/// Read one byte, polling until `deadline`. `None` means the budget is spent.
fn read_byte_until<R: Read + ?Sized>(port: &mut R, deadline: Instant) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match port.read(&mut buf) {
            Ok(1) => return Ok(Some(buf[0])),
            Ok(_) => {},
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {},
            Err(e) => return Err(Error::Io(e)),
        }

        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Accumulate a text reply until `until` is satisfied or `timeout` elapses.
///
/// An empty result means nothing arrived in time. A partial reply is
/// returned as-is; callers compare it against what they expect.
pub fn recv_ret_string<R: Read + ?Sized>(
    port: &mut R,
    until: Terminator,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut reply = Vec::new();
    if until == Terminator::Length(0) {
        return Ok(reply);
    }

    let deadline = Instant::now() + timeout;
    while let Some(byte) = read_byte_until(port, deadline)? {
        reply.push(byte);
        let done = match until {
            Terminator::Tail => reply.ends_with(&TAIL),
            Terminator::Ack => byte == ACK,
            Terminator::Length(n) => reply.len() >= n,
            Terminator::Timeout => false,
        };
        if done {
            break;
        }
    }

    trace!("Received {} bytes: {:02X?}", reply.len(), reply);
    Ok(reply)
}

/// Read a firmware update acknowledgment into `response`.
///
/// The first byte decides how many follow (see [`AckFormat::reply_len`]).
/// Returns the number of bytes read: 0 on timeout, less than the announced
/// length when the display stalls mid-reply.
pub fn recv_ret_for_update<R: Read + ?Sized>(
    port: &mut R,
    format: AckFormat,
    response: &mut [u8; MAX_REPLY_LEN],
    timeout: Duration,
) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    let Some(first) = read_byte_until(port, deadline)? else {
        return Ok(0);
    };
    response[0] = first;

    let needed = format.reply_len(first);
    let mut count = 1;
    while count < needed {
        match read_byte_until(port, deadline)? {
            Some(byte) => {
                response[count] = byte;
                count += 1;
            },
            None => break,
        }
    }

    trace!("Update reply: {:02X?}", &response[..count]);
    Ok(count)
}

/// Extract the value of a numeric reply, with or without its tail.
pub fn parse_numeric(reply: &[u8]) -> Option<u32> {
    let body = reply.strip_suffix(&TAIL).unwrap_or(reply);
    match body {
        [NUMERIC_REPLY, value @ ..] if value.len() == 4 => Some(LittleEndian::read_u32(value)),
        _ => None,
    }
}
