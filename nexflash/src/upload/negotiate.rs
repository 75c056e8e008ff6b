//! Handshake that brings the display into firmware update mode.

use super::NexUpload;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::ack::ACK;
use crate::protocol::response::{NUMERIC_REPLY, parse_numeric};
use crate::protocol::{Command, Terminator, recv_ret_string, send_command};
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// String the display is asked to print back during the echo test.
pub const ECHO_TEST_INPUT: &str = "mystop_yesABC";

/// Settle time after waking the display.
const WAKE_DELAY: Duration = Duration::from_millis(150);

/// Settle time after turning the backlight back on.
const DIM_DELAY: Duration = Duration::from_millis(15);

/// Quiet time before the running mode switch.
const RUNMOD_PRE_DELAY: Duration = Duration::from_millis(100);

/// The display is deaf for a moment after the running mode switch.
const RUNMOD_POST_DELAY: Duration = Duration::from_millis(60);

impl<P: Port + ?Sized> NexUpload<'_, P> {
    /// Run the whole negotiation, ending at the transfer baud rate.
    pub(super) fn connect(&mut self) -> Result<()> {
        info!("Connecting to display on {}...", self.port.name());
        self.port.clear_buffers()?;

        if !self.echo_test(ECHO_TEST_INPUT)? {
            return Err(Error::HandshakeFailed("echo test failed".into()));
        }
        self.handling_sleep_and_dim()?;
        self.set_running_mode()?;
        self.set_prepare_for_firmware_update()?;

        info!("Display ready for update at {} baud", self.baudrate);
        Ok(())
    }

    /// Ask the display to print `input` and check the reply matches exactly.
    pub fn echo_test(&mut self, input: &str) -> Result<bool> {
        send_command(&mut *self.port, &Command::echo(input))?;
        let reply = recv_ret_string(
            &mut *self.port,
            Terminator::Length(input.len()),
            self.config.timeout,
        )?;

        let matched = reply == input.as_bytes();
        if !matched {
            debug!(
                "Echo mismatch: sent {input:?}, got {:?}",
                String::from_utf8_lossy(&reply)
            );
        }
        Ok(matched)
    }

    /// Read a system variable. Events the display emits meanwhile (e.g. the
    /// wake-up notification) are skipped.
    ///
    /// Silence is a timeout; a malformed numeric reply, or only events until
    /// the budget runs out, fails the handshake.
    fn query(&mut self, variable: &str) -> Result<u32> {
        send_command(&mut *self.port, &Command::get(variable))?;

        let deadline = Instant::now() + self.config.timeout;
        let mut events = 0u32;
        loop {
            let budget = deadline.saturating_duration_since(Instant::now());
            let reply = recv_ret_string(&mut *self.port, Terminator::Tail, budget)?;
            if reply.is_empty() && events == 0 {
                return Err(Error::Timeout(format!("no reply to get {variable}")));
            }
            if reply.is_empty() {
                return Err(Error::HandshakeFailed(format!(
                    "no value for get {variable} after {events} events"
                )));
            }
            if let Some(value) = parse_numeric(&reply) {
                debug!("{variable} = {value}");
                return Ok(value);
            }
            if reply.first() == Some(&NUMERIC_REPLY) || budget.is_zero() {
                return Err(Error::HandshakeFailed(format!(
                    "invalid reply to get {variable}: {reply:02X?}"
                )));
            }
            events += 1;
            debug!("Skipping event {reply:02X?} while waiting for {variable}");
        }
    }

    /// Wake the display and turn the backlight on if needed.
    ///
    /// `dim` is queried only after the display is awake, since a sleeping
    /// display may report the dimmed sleep level instead of the configured
    /// one.
    fn handling_sleep_and_dim(&mut self) -> Result<()> {
        if self.query("sleep")? != 0 {
            debug!("Display is sleeping, waking it up");
            send_command(&mut *self.port, &Command::assign("sleep", 0))?;
            thread::sleep(WAKE_DELAY);
        }

        if self.query("dim")? == 0 {
            debug!("Backlight is off, setting dim=100");
            send_command(&mut *self.port, &Command::assign("dim", 100))?;
            thread::sleep(DIM_DELAY);
        }
        Ok(())
    }

    /// Switch to the mode the vendor editor uses for uploads. Not answered.
    fn set_running_mode(&mut self) -> Result<()> {
        thread::sleep(RUNMOD_PRE_DELAY);
        send_command(&mut *self.port, &Command::running_mode())?;
        thread::sleep(RUNMOD_POST_DELAY);
        Ok(())
    }

    /// Announce the image size and transfer baud rate, then follow the
    /// display to the new rate and wait for its ack.
    fn set_prepare_for_firmware_update(&mut self) -> Result<()> {
        let cmd = Command::prepare_update(self.config.ack_format, self.file_size, self.baudrate);
        debug!("Sending {:?}", cmd.text());

        send_command(&mut *self.port, &Command::new("00"))?;
        send_command(&mut *self.port, &cmd)?;

        if self.port.baud_rate() != self.baudrate {
            debug!(
                "Switching baud rate {} -> {}",
                self.port.baud_rate(),
                self.baudrate
            );
            self.port.set_baud_rate(self.baudrate)?;
        }

        let reply = recv_ret_string(&mut *self.port, Terminator::Ack, self.config.timeout)?;
        if reply.contains(&ACK) {
            return Ok(());
        }

        if reply.is_empty() {
            warn!("Display did not acknowledge the update command");
        }
        Err(Error::HandshakeFailed(format!(
            "update command not acknowledged (reply {reply:02X?})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AckFormat;
    use crate::test_util::{FakeDisplay, MockPort};
    use crate::upload::UploadConfig;

    fn session(port: &mut MockPort, format: AckFormat) -> NexUpload<'_, MockPort> {
        let config = UploadConfig {
            timeout: Duration::from_millis(30),
            ack_format: format,
            ..UploadConfig::default()
        };
        NexUpload::new(port, 115200, 10000).with_config(config)
    }

    #[test]
    fn test_echo_test_matches() {
        let mut port = MockPort::new().with_display(FakeDisplay::new());
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(upload.echo_test(ECHO_TEST_INPUT).unwrap());
    }

    #[test]
    fn test_echo_test_silent_display() {
        let mut display = FakeDisplay::new();
        display.echo = false;
        let mut port = MockPort::new().with_display(display);
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(!upload.echo_test(ECHO_TEST_INPUT).unwrap());
    }

    #[test]
    fn test_echo_test_garbled_reply() {
        let mut port = MockPort::new().with_rx(b"mystop_noABCD");
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(!upload.echo_test(ECHO_TEST_INPUT).unwrap());
    }

    #[test]
    fn test_sleep_and_dim_are_normalized_once() {
        let display = FakeDisplay::new().with_state(1, 0);
        let mut port = MockPort::new().with_display(display);
        {
            let mut upload = session(&mut port, AckFormat::Skip);
            upload.handling_sleep_and_dim().unwrap();
        }
        assert_eq!(port.display().assignments, vec!["sleep=0", "dim=100"]);
        assert_eq!(port.display().sleep, 0);
        assert_eq!(port.display().dim, 100);

        port.writes.clear();
        {
            let mut upload = session(&mut port, AckFormat::Skip);
            upload.handling_sleep_and_dim().unwrap();
        }
        assert_eq!(port.commands(), vec!["get sleep", "get dim"]);
        assert_eq!(port.display().assignments.len(), 2);
    }

    #[test]
    fn test_query_skips_events() {
        // Wake-up event 0x87 arrives before the numeric reply
        let mut port = MockPort::new().with_rx(&[
            0x87, 0xFF, 0xFF, 0xFF, 0x71, 0x32, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF,
        ]);
        let mut upload = session(&mut port, AckFormat::Skip);
        assert_eq!(upload.query("dim").unwrap(), 50);
    }

    #[test]
    fn test_query_malformed_numeric_reply_fails_handshake() {
        // 0x71 with only two value bytes before the tail
        let mut port = MockPort::new().with_rx(&[0x71, 0x01, 0x00, 0xFF, 0xFF, 0xFF]);
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(matches!(
            upload.query("sleep"),
            Err(Error::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_query_only_events_fails_handshake() {
        let mut port = MockPort::new().with_rx(&[0x87, 0xFF, 0xFF, 0xFF, 0x88, 0xFF, 0xFF, 0xFF]);
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(matches!(
            upload.query("dim"),
            Err(Error::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_query_without_reply_times_out() {
        let mut port = MockPort::new();
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(upload.query("sleep").unwrap_err().is_timeout());
    }

    #[test]
    fn test_running_mode_is_fire_and_forget() {
        let mut port = MockPort::new().with_display(FakeDisplay::new());
        {
            let mut upload = session(&mut port, AckFormat::Skip);
            upload.set_running_mode().unwrap();
        }
        assert_eq!(port.commands(), vec!["runmod=2"]);
        assert_eq!(port.rx_len(), 0);
    }

    #[test]
    fn test_prepare_switches_baud_and_waits_for_ack() {
        let mut port = MockPort::new().with_display(FakeDisplay::new());
        {
            let mut upload = session(&mut port, AckFormat::Skip);
            upload.set_prepare_for_firmware_update().unwrap();
        }
        assert_eq!(port.commands(), vec!["00", "whmi-wris 10000,115200,1"]);
        assert_eq!(port.baud_changes, vec![115200]);
        assert!(port.display().in_update);
    }

    #[test]
    fn test_prepare_legacy_command() {
        let mut port = MockPort::new().with_display(FakeDisplay::new());
        {
            let mut upload = session(&mut port, AckFormat::Legacy);
            upload.set_prepare_for_firmware_update().unwrap();
        }
        assert_eq!(port.commands()[1], "whmi-wri 10000,115200,0");
    }

    #[test]
    fn test_prepare_without_ack_fails() {
        let mut display = FakeDisplay::new();
        display.accept_update = false;
        let mut port = MockPort::new().with_display(display);
        let mut upload = session(&mut port, AckFormat::Skip);
        assert!(matches!(
            upload.set_prepare_for_firmware_update(),
            Err(Error::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_begin_sends_handshake_in_order() {
        let mut port = MockPort::new().with_display(FakeDisplay::new());
        {
            let mut upload = session(&mut port, AckFormat::Skip);
            upload.begin().unwrap();
            assert!(upload.is_connected());
            // Already connected: nothing more is sent
            upload.begin().unwrap();
        }
        assert_eq!(
            port.commands(),
            vec![
                "print \"mystop_yesABC\"",
                "get sleep",
                "get dim",
                "runmod=2",
                "00",
                "whmi-wris 10000,115200,1",
            ]
        );
    }

    #[test]
    fn test_begin_stops_on_echo_mismatch() {
        let mut display = FakeDisplay::new();
        display.echo = false;
        let mut port = MockPort::new().with_display(display);
        {
            let mut upload = session(&mut port, AckFormat::Skip);
            assert!(matches!(upload.begin(), Err(Error::HandshakeFailed(_))));
            assert!(!upload.is_connected());
        }
        assert_eq!(port.commands(), vec!["print \"mystop_yesABC\""]);
    }
}
