// src/transport/io_helpers.rs

use super::RtuTransport;
use crate::common::{
    error::ModbusError,
    frame::MIN_RESPONSE_LEN,
    function::is_exception,
    hal_traits::{ModbusSerial, ModbusTimer},
    timing,
};
use nb::Result as NbResult;

// Implementation block for I/O related helpers
impl<IF> RtuTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    /// Executes a non-blocking I/O operation (`f`) repeatedly until it
    /// stops returning `WouldBlock`, returning the final result or a timeout error.
    pub(super) fn execute_blocking_io_until<FN, T>(
        &mut self,
        deadline: IF::Instant,
        mut f: FN,
    ) -> Result<T, ModbusError<IF::Error>>
    where
        FN: FnMut(&mut IF) -> NbResult<T, IF::Error>,
    {
        loop {
            match f(&mut self.interface) {
                Ok(result) => return Ok(result),
                Err(nb::Error::WouldBlock) => {
                    if self.interface.now() >= deadline {
                        return Err(ModbusError::Timeout);
                    }
                    self.interface.delay_us(timing::WRITE_RETRY_DELAY_US);
                }
                Err(nb::Error::Other(e)) => return Err(ModbusError::Io(e)),
            }
        }
    }

    /// Waits out whatever is left of the inter-frame silence after the previous exchange.
    pub(super) fn ensure_bus_idle(&mut self) {
        if let Some(last) = self.last_exchange {
            let since = self.interface.now() - last;
            if since < timing::INTER_FRAME_SILENCE {
                let remaining = timing::INTER_FRAME_SILENCE - since;
                self.interface.delay_us(remaining.as_micros() as u32);
            }
        }
    }

    /// Throws away anything already sitting in the receive buffer, e.g. a late
    /// reply to an earlier request that timed out.
    pub(super) fn discard_stale_input(&mut self) -> Result<usize, ModbusError<IF::Error>> {
        let mut discarded = 0;
        while discarded < timing::STALE_DRAIN_LIMIT {
            match self.interface.read_byte() {
                Ok(_) => discarded += 1,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => return Err(ModbusError::Io(e)),
            }
        }
        Ok(discarded)
    }

    /// Writes a complete frame and waits for it to leave the transmitter.
    pub(super) fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError<IF::Error>> {
        let deadline = self.interface.now() + timing::write_budget(frame.len());

        for (written, byte) in frame.iter().enumerate() {
            match self.execute_blocking_io_until(deadline, |iface| iface.write_byte(*byte)) {
                Ok(()) => {}
                Err(ModbusError::Timeout) => {
                    return Err(ModbusError::WriteIncomplete { written, expected: frame.len() });
                }
                Err(e) => return Err(e),
            }
        }

        self.execute_blocking_io_until(deadline, |iface| iface.flush())
    }

    /// Collects one response frame into `buffer`.
    ///
    /// The response window starts now (the end of the write) and is checked
    /// against the timer on every wake-up. A frame ends when `expected_len`
    /// bytes have arrived, when an exception reply is complete, or when the line
    /// stays silent for the inter-frame gap after at least one byte.
    pub(super) fn read_frame(
        &mut self,
        buffer: &mut [u8],
        expected_len: usize,
    ) -> Result<usize, ModbusError<IF::Error>> {
        let deadline = self.interface.now() + self.response_timeout;
        let mut bytes_read = 0;

        loop {
            match self.interface.read_byte() {
                Ok(byte) => {
                    if bytes_read >= buffer.len() {
                        return Err(ModbusError::BufferOverflow {
                            needed: bytes_read + 1,
                            got: buffer.len(),
                        });
                    }
                    buffer[bytes_read] = byte;
                    bytes_read += 1;

                    if frame_complete(&buffer[..bytes_read], expected_len) {
                        return Ok(bytes_read);
                    }
                }
                Err(nb::Error::WouldBlock) => {
                    if bytes_read == 0 {
                        let now = self.interface.now();
                        if now >= deadline {
                            return Err(ModbusError::Timeout);
                        }
                        // Spurious wake-ups just loop back and recompute the remaining window.
                        self.interface.wait_readable(deadline - now).map_err(ModbusError::Io)?;
                    } else if !self
                        .interface
                        .wait_readable(timing::INTER_FRAME_SILENCE)
                        .map_err(ModbusError::Io)?
                    {
                        return Ok(bytes_read);
                    }
                }
                Err(nb::Error::Other(e)) => return Err(ModbusError::Io(e)),
            }
        }
    }
}

fn frame_complete(received: &[u8], expected_len: usize) -> bool {
    received.len() >= expected_len
        || (received.len() >= MIN_RESPONSE_LEN && is_exception(received[1]))
}

// --- Unit Tests for IO Helpers ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockCommError, MockInstant, MockInterface};
    use core::time::Duration;

    #[test]
    fn test_execute_blocking_io_until() {
        let mut transport = RtuTransport::new(MockInterface::new());

        let mut calls = 0;
        let result_ok: Result<i32, _> = transport.execute_blocking_io_until(MockInstant(10_000), |iface| {
            calls += 1;
            iface.advance_time(1_000);
            if calls < 4 { Err(nb::Error::WouldBlock) } else { Ok(123) }
        });
        assert_eq!(result_ok.unwrap(), 123);
        assert_eq!(calls, 4);

        transport.interface_mut().current_time_us = 0;
        let result_timeout: Result<(), _> = transport.execute_blocking_io_until(MockInstant(5_000), |iface| {
            iface.advance_time(2_000);
            Err(nb::Error::WouldBlock)
        });
        assert!(matches!(result_timeout, Err(ModbusError::Timeout)));

        let result_io_err: Result<(), _> = transport
            .execute_blocking_io_until(MockInstant(u64::MAX), |_| Err(nb::Error::Other(MockCommError)));
        assert!(matches!(result_io_err, Err(ModbusError::Io(MockCommError))));
    }

    #[test]
    fn test_read_frame_expected_length() {
        let mut mock = MockInterface::new();
        mock.stage_stale(&[0xFE, 0x04, 0x02, 0x01, 0x90, 0xAA, 0xBB, 0x99]);
        let mut transport = RtuTransport::new(mock);
        let mut buffer = [0u8; 32];

        let len = transport.read_frame(&mut buffer, 7).unwrap();
        assert_eq!(len, 7);
        // The trailing byte is left for the next drain.
        assert_eq!(transport.interface().unread(), 1);
    }

    #[test]
    fn test_read_frame_ends_on_silence() {
        let mut mock = MockInterface::new();
        mock.stage_stale(&[0xFE, 0x04, 0x02]);
        let mut transport = RtuTransport::new(mock);
        let mut buffer = [0u8; 32];

        let len = transport.read_frame(&mut buffer, 7).unwrap();
        assert_eq!(len, 3);
        assert_eq!(transport.interface().current_time_us, 5_000);
    }

    #[test]
    fn test_read_frame_exception_terminates_early() {
        let mut mock = MockInterface::new();
        mock.stage_stale(&[0xFE, 0x84, 0x02, 0x11, 0x22, 0x33, 0x44]);
        let mut transport = RtuTransport::new(mock);
        let mut buffer = [0u8; 32];

        assert_eq!(transport.read_frame(&mut buffer, 255).unwrap(), 5);
    }

    #[test]
    fn test_read_frame_timeout_no_data() {
        let mut transport = RtuTransport::new(MockInterface::new());
        let mut buffer = [0u8; 32];
        assert!(matches!(transport.read_frame(&mut buffer, 7), Err(ModbusError::Timeout)));
        assert_eq!(transport.interface().current_time_us, 180_000);
    }

    #[test]
    fn test_read_frame_buffer_overflow() {
        let mut mock = MockInterface::new();
        mock.stage_stale(&[0xFE, 0x04, 0x04, 0x00, 0x01, 0x00]);
        let mut transport = RtuTransport::new(mock);
        let mut buffer = [0u8; 4];
        assert!(matches!(
            transport.read_frame(&mut buffer, 9),
            Err(ModbusError::BufferOverflow { needed: 5, got: 4 })
        ));
    }

    #[test]
    fn test_send_frame_success() {
        let mut transport = RtuTransport::new(MockInterface::new());
        transport.send_frame(&[0xFE, 0x04, 0x00, 0x03]).unwrap();
        assert_eq!(transport.interface().write_log.as_slice(), &[0xFE, 0x04, 0x00, 0x03]);
        assert_eq!(transport.interface().flush_count, 1);
    }

    #[test]
    fn test_send_frame_incomplete() {
        let mut mock = MockInterface::new();
        mock.write_limit = Some(3);
        let mut transport = RtuTransport::new(mock);
        assert!(matches!(
            transport.send_frame(&[1, 2, 3, 4, 5, 6, 7, 8]),
            Err(ModbusError::WriteIncomplete { written: 3, expected: 8 })
        ));
        assert!(transport.interface().current_time_us as u128 >= timing::write_budget(8).as_micros());
    }

    #[test]
    fn test_discard_stale_input() {
        let mut mock = MockInterface::new();
        mock.stage_stale(&[0x01, 0x02, 0x03]);
        let mut transport = RtuTransport::new(mock);
        assert_eq!(transport.discard_stale_input().unwrap(), 3);
        assert_eq!(transport.interface().unread(), 0);
        assert_eq!(transport.discard_stale_input().unwrap(), 0);
    }

    #[test]
    fn test_ensure_bus_idle_waits_out_silence() {
        let mut mock = MockInterface::new();
        mock.current_time_us = 10_000;
        let mut transport = RtuTransport::new(mock);
        transport.last_exchange = Some(MockInstant(8_000));
        transport.ensure_bus_idle();
        assert_eq!(transport.interface().current_time_us, 13_000);

        transport.last_exchange = Some(MockInstant(0));
        transport.ensure_bus_idle();
        assert_eq!(transport.interface().current_time_us, 13_000);
    }

    #[test]
    fn test_deadline_duration() {
        assert_eq!(timing::RESPONSE_TIMEOUT, Duration::from_millis(180));
    }
}
