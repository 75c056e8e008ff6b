//! Test doubles shared by the unit tests.

use crate::error::Result;
use crate::port::Port;
use crate::protocol::ack::ACK;
use crate::protocol::command::{NULL_HEAD, TAIL};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// `connect` reply of a 3.5" touch display.
pub(crate) const COMOK: &str =
    "comok 1,30601-0,NX4832T035_011R,163,61488,D264B8204F0E1828,16777216";

/// Mock serial port with separate read/write buffers.
///
/// Every `flush` closes one write chunk. When a [`FakeDisplay`] is attached
/// it sees each chunk and may queue a reply.
pub(crate) struct MockPort {
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    pub(crate) writes: Vec<Vec<u8>>,
    pub(crate) baud_changes: Vec<u32>,
    pub(crate) display: Option<FakeDisplay>,
    baud: u32,
    timeout: Duration,
    write_limit: Option<usize>,
    accepted: usize,
    read_error: Option<ErrorKind>,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            pending: Vec::new(),
            writes: Vec::new(),
            baud_changes: Vec::new(),
            display: None,
            baud: 9600,
            timeout: Duration::from_millis(10),
            write_limit: None,
            accepted: 0,
            read_error: None,
        }
    }

    pub(crate) fn with_rx(mut self, data: &[u8]) -> Self {
        self.rx.extend(data.iter().copied());
        self
    }

    pub(crate) fn with_display(mut self, display: FakeDisplay) -> Self {
        self.display = Some(display);
        self
    }

    /// Accept only `limit` bytes in total, then report zero-length writes.
    pub(crate) fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub(crate) fn with_read_error(mut self, kind: ErrorKind) -> Self {
        self.read_error = Some(kind);
        self
    }

    pub(crate) fn rx_len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn display(&self) -> &FakeDisplay {
        self.display.as_ref().expect("no fake display attached")
    }

    /// Text of every framed command written, in order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.writes
            .iter()
            .filter(|w| w.ends_with(&TAIL))
            .map(|w| command_text(w))
            .collect()
    }
}

fn command_text(chunk: &[u8]) -> String {
    let body = chunk.strip_suffix(&TAIL).unwrap_or(chunk);
    let body = body.strip_prefix(&[NULL_HEAD]).unwrap_or(body);
    String::from_utf8_lossy(body).into_owned()
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some(kind) = self.read_error {
            return Err(std::io::Error::new(kind, "injected"));
        }
        if self.rx.is_empty() {
            return Err(std::io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = match self.write_limit {
            Some(limit) => buf.len().min(limit.saturating_sub(self.accepted)),
            None => buf.len(),
        };
        self.accepted += n;
        self.pending.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.pending);
        if let Some(display) = self.display.as_mut() {
            if let Some(reply) = display.respond(&chunk, self.baud) {
                self.rx.extend(reply);
            }
        }
        self.writes.push(chunk);
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud = baud_rate;
        self.baud_changes.push(baud_rate);
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn clear_buffers(&mut self) -> Result<()> {
        // Scripted replies must survive, so only stale output is dropped
        self.pending.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Scripted display that answers the commands an upload session sends.
pub(crate) struct FakeDisplay {
    pub(crate) sleep: u32,
    pub(crate) dim: u32,
    pub(crate) echo: bool,
    pub(crate) accept_update: bool,
    pub(crate) in_update: bool,
    /// Reply per received section; `None` stays silent. Exhausted → `0x05`.
    pub(crate) section_replies: VecDeque<Option<Vec<u8>>>,
    /// Length of every section received, retransmissions included.
    pub(crate) sections: Vec<usize>,
    /// First bytes of every section received.
    pub(crate) section_heads: Vec<u8>,
    pub(crate) assignments: Vec<String>,
    pub(crate) resets: usize,
    /// Every text command received with the port baud rate at that moment.
    pub(crate) heard: Vec<(String, u32)>,
    /// Reply to `connect`; silent when `None`.
    pub(crate) connect_reply: Option<String>,
    /// Only answer `connect` at this baud rate (any rate when `None`).
    pub(crate) connect_baud: Option<u32>,
}

impl FakeDisplay {
    pub(crate) fn new() -> Self {
        Self {
            sleep: 0,
            dim: 100,
            echo: true,
            accept_update: true,
            in_update: false,
            section_replies: VecDeque::new(),
            sections: Vec::new(),
            section_heads: Vec::new(),
            assignments: Vec::new(),
            resets: 0,
            heard: Vec::new(),
            connect_reply: Some(COMOK.to_string()),
            connect_baud: None,
        }
    }

    pub(crate) fn with_state(mut self, sleep: u32, dim: u32) -> Self {
        self.sleep = sleep;
        self.dim = dim;
        self
    }

    pub(crate) fn with_section_replies(
        mut self,
        replies: impl IntoIterator<Item = Option<Vec<u8>>>,
    ) -> Self {
        self.section_replies = replies.into_iter().collect();
        self
    }

    fn numeric(value: u32) -> Vec<u8> {
        let mut reply = vec![0x71];
        reply.extend_from_slice(&value.to_le_bytes());
        reply.extend_from_slice(&TAIL);
        reply
    }

    fn respond(&mut self, chunk: &[u8], baud: u32) -> Option<Vec<u8>> {
        if chunk == b"rest\xff\xff\xff" {
            self.heard.push(("rest".to_string(), baud));
            self.in_update = false;
            self.resets += 1;
            return None;
        }
        if self.in_update {
            self.sections.push(chunk.len());
            self.section_heads.push(chunk[0]);
            return self
                .section_replies
                .pop_front()
                .unwrap_or_else(|| Some(vec![ACK]));
        }

        let text = command_text(chunk);
        self.heard.push((text.clone(), baud));
        if let Some(inner) = text
            .strip_prefix("print \"")
            .and_then(|t| t.strip_suffix('"'))
        {
            return self.echo.then(|| inner.as_bytes().to_vec());
        }
        if text.starts_with("whmi-wri") {
            self.in_update = self.accept_update;
            return self.accept_update.then(|| vec![ACK]);
        }

        match text.as_str() {
            "get sleep" => Some(Self::numeric(self.sleep)),
            "get dim" => Some(Self::numeric(self.dim)),
            "connect" if self.connect_baud.is_none_or(|b| b == baud) => {
                self.connect_reply.as_ref().map(|line| {
                    let mut reply = line.as_bytes().to_vec();
                    reply.extend_from_slice(&TAIL);
                    reply
                })
            },
            _ => {
                if let Some((var, value)) = text.split_once('=') {
                    let value = value.parse().unwrap_or(0);
                    match var {
                        "sleep" => self.sleep = value,
                        "dim" => self.dim = value,
                        _ => return None,
                    }
                    self.assignments.push(text.clone());
                }
                None
            },
        }
    }
}
