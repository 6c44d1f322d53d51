// src/transport/mock.rs

//! Simulated serial line and timer shared by the transport and sensor tests.

use crate::common::{
    crc::{crc16, verify_frame_crc},
    frame::{encode_register_response, Request, REQUEST_FRAME_LEN},
    function::FunctionCode,
    hal_traits::{ModbusSerial, ModbusTimer},
    SlaveAddr,
};
use arrayvec::ArrayVec;
use core::time::Duration;
use nb::Result as NbResult;

// --- Mock Instant ---
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct MockInstant(pub u64);

impl core::ops::Add<Duration> for MockInstant {
    type Output = Self;
    fn add(self, rhs: Duration) -> Self {
        MockInstant(self.0.saturating_add(rhs.as_micros() as u64))
    }
}

impl core::ops::Sub<MockInstant> for MockInstant {
    type Output = Duration;
    fn sub(self, rhs: MockInstant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(rhs.0))
    }
}

// --- Mock Comm Error ---
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MockCommError;

type Frame = ArrayVec<u8, 256>;

/// A fake UART plus clock.
///
/// Replies staged with [`MockInterface::stage_reply`] only become readable
/// `reply_delay_us` after the next flush, like a real slave answering a request.
/// Bytes staged with [`MockInterface::stage_stale`] are readable immediately.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockInterface {
    pub current_time_us: u64,
    pub read_queue: ArrayVec<u8, 512>,
    pub read_pos: usize,
    pub write_log: ArrayVec<u8, 512>,
    pub flush_count: u32,
    pub wait_calls: u32,
    pub reply_delay_us: u64,
    /// Accept this many bytes in total, then report the transmitter busy forever.
    pub write_limit: Option<usize>,
    /// Answer every well-formed read with register values equal to the start
    /// address (plus the register offset) instead of using staged replies.
    pub auto_reply: bool,
    /// Requests seen in auto-reply mode that were not a clean 8-byte frame.
    pub garbled_requests: u32,
    pub auto_replies: u32,
    replies: ArrayVec<Frame, 8>,
    pending: Option<(u64, Frame)>,
    tx_since_flush: Frame,
    total_written: usize,
}

impl MockInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_time(&mut self, us: u64) {
        self.current_time_us = self.current_time_us.saturating_add(us);
    }

    /// Queues the reply to the next request.
    pub fn stage_reply(&mut self, data: &[u8]) {
        let mut frame = Frame::new();
        frame.try_extend_from_slice(data).expect("mock reply too long");
        self.replies.push(frame);
    }

    /// Puts bytes on the line right now, before any request.
    pub fn stage_stale(&mut self, data: &[u8]) {
        self.read_queue.try_extend_from_slice(data).expect("mock read queue full");
    }

    pub fn unread(&self) -> usize {
        self.read_queue.len() - self.read_pos
    }

    fn release_pending(&mut self) {
        if let Some((_, frame)) = self.pending.take() {
            if self.read_pos == self.read_queue.len() {
                self.read_queue.clear();
                self.read_pos = 0;
            }
            self.read_queue.try_extend_from_slice(&frame).expect("mock read queue full");
        }
    }

    fn answer(&mut self, request: &[u8]) -> Option<Frame> {
        if request.len() != REQUEST_FRAME_LEN || verify_frame_crc::<MockCommError>(request).is_err() {
            self.garbled_requests += 1;
            return None;
        }
        let slave = SlaveAddr::new(request[0]).ok()?;
        let function = match request[1] {
            0x03 => FunctionCode::ReadHoldingRegisters,
            0x04 => FunctionCode::ReadInputRegisters,
            0x06 => {
                let mut echo = Frame::new();
                echo.try_extend_from_slice(request).ok()?;
                return Some(echo);
            }
            _ => return None,
        };
        let start = u16::from_be_bytes([request[2], request[3]]);
        let count = u16::from_be_bytes([request[4], request[5]]);
        let values: ArrayVec<u16, 125> = (0..count.min(125)).map(|i| start.wrapping_add(i)).collect();
        let reply = encode_register_response(slave, function, &values).ok()?;
        let mut frame = Frame::new();
        frame.try_extend_from_slice(&reply).ok()?;
        Some(frame)
    }
}

impl ModbusTimer for MockInterface {
    type Instant = MockInstant;

    fn now(&self) -> Self::Instant {
        MockInstant(self.current_time_us)
    }

    fn delay_us(&mut self, us: u32) {
        self.advance_time(us as u64);
    }
}

impl ModbusSerial for MockInterface {
    type Error = MockCommError;

    fn read_byte(&mut self) -> NbResult<u8, Self::Error> {
        if let Some((ready_at, _)) = self.pending {
            if ready_at <= self.current_time_us {
                self.release_pending();
            }
        }
        match self.read_queue.get(self.read_pos) {
            Some(byte) => {
                self.read_pos += 1;
                Ok(*byte)
            }
            None => Err(nb::Error::WouldBlock),
        }
    }

    fn write_byte(&mut self, byte: u8) -> NbResult<(), Self::Error> {
        if let Some(limit) = self.write_limit {
            if self.total_written >= limit {
                return Err(nb::Error::WouldBlock);
            }
        }
        self.total_written += 1;
        let _ = self.write_log.try_push(byte);
        let _ = self.tx_since_flush.try_push(byte);
        Ok(())
    }

    fn flush(&mut self) -> NbResult<(), Self::Error> {
        self.flush_count += 1;
        let sent = core::mem::take(&mut self.tx_since_flush);
        let reply = if self.auto_reply {
            let answer = self.answer(&sent);
            if answer.is_some() {
                self.auto_replies += 1;
            }
            answer
        } else if self.replies.is_empty() {
            None
        } else {
            Some(self.replies.remove(0))
        };
        if let Some(frame) = reply {
            self.pending = Some((self.current_time_us + self.reply_delay_us, frame));
        }
        Ok(())
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error> {
        self.wait_calls += 1;
        if self.unread() > 0 {
            return Ok(true);
        }
        let timeout_us = timeout.as_micros() as u64;
        if let Some((ready_at, _)) = self.pending {
            if ready_at <= self.current_time_us + timeout_us {
                self.current_time_us = self.current_time_us.max(ready_at);
                self.release_pending();
                return Ok(true);
            }
        }
        self.advance_time(timeout_us);
        Ok(false)
    }
}

/// Encodes a request frame and returns it, for comparing against the write log.
pub(crate) fn wire(request: &Request) -> [u8; REQUEST_FRAME_LEN] {
    request.encode()
}

/// Builds a read reply with a deliberately wrong CRC.
pub(crate) fn corrupt_reply(slave: SlaveAddr, function: FunctionCode, values: &[u16]) -> Frame {
    let mut frame = Frame::new();
    let good = encode_register_response(slave, function, values).expect("valid reply");
    frame.try_extend_from_slice(&good).expect("fits");
    let last = frame.len() - 1;
    frame[last] = frame[last].wrapping_add(1);
    debug_assert_ne!(crc16(&frame[..frame.len() - 2]).to_be_bytes()[1], frame[last]);
    frame
}
