// src/common/frame.rs

use super::address::SlaveAddr;
use super::crc::{crc16, decode_crc, encode_crc, verify_frame_crc};
use super::error::ModbusError;
use super::function::{is_exception, FunctionCode};
use arrayvec::ArrayVec;
use core::fmt::Debug;

/// Every request this crate sends is exactly 8 bytes:
/// address, function, two 16-bit fields, CRC.
pub const REQUEST_FRAME_LEN: usize = 8;
/// Smallest valid response: address, function, one byte, CRC (exception replies).
pub const MIN_RESPONSE_LEN: usize = 5;
/// Largest RTU frame.
pub const MAX_FRAME_LEN: usize = 256;
/// Largest register count a single read may ask for.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Register values decoded from one read reply.
pub type RegisterValues = ArrayVec<u16, { MAX_READ_REGISTERS as usize }>;

/// One request to a slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    ReadHoldingRegisters { slave: SlaveAddr, start: u16, count: u16 },
    ReadInputRegisters { slave: SlaveAddr, start: u16, count: u16 },
    WriteSingleRegister { slave: SlaveAddr, register: u16, value: u16 },
}

impl Request {
    pub fn slave(&self) -> SlaveAddr {
        match *self {
            Request::ReadHoldingRegisters { slave, .. }
            | Request::ReadInputRegisters { slave, .. }
            | Request::WriteSingleRegister { slave, .. } => slave,
        }
    }

    pub fn function(&self) -> FunctionCode {
        match self {
            Request::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Request::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Request::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
        }
    }

    /// Register count of a read, `None` for writes.
    pub fn register_count(&self) -> Option<u16> {
        match *self {
            Request::ReadHoldingRegisters { count, .. } | Request::ReadInputRegisters { count, .. } => {
                Some(count)
            }
            Request::WriteSingleRegister { .. } => None,
        }
    }

    /// Checks the request can be put on the wire.
    pub fn validate<E: Debug>(&self) -> Result<(), ModbusError<E>> {
        match self.register_count() {
            Some(0) => Err(ModbusError::InvalidRequest("register count must be at least 1")),
            Some(count) if count > MAX_READ_REGISTERS => {
                Err(ModbusError::InvalidRequest("register count exceeds 125"))
            }
            _ => Ok(()),
        }
    }

    /// Encodes the 8-byte request frame (big-endian fields, CRC last).
    pub fn encode(&self) -> [u8; REQUEST_FRAME_LEN] {
        let (first, second) = match *self {
            Request::ReadHoldingRegisters { start, count, .. }
            | Request::ReadInputRegisters { start, count, .. } => (start, count),
            Request::WriteSingleRegister { register, value, .. } => (register, value),
        };
        let mut frame = [0u8; REQUEST_FRAME_LEN];
        frame[0] = self.slave().as_u8();
        frame[1] = self.function().code();
        frame[2..4].copy_from_slice(&first.to_be_bytes());
        frame[4..6].copy_from_slice(&second.to_be_bytes());
        let crc = crc16(&frame[..6]);
        frame[6..8].copy_from_slice(&encode_crc(crc));
        frame
    }

    /// Length of a well-formed, non-exception reply: `5 + 2n` for reads,
    /// 8 for the write echo.
    pub fn expected_response_len(&self) -> usize {
        match self.register_count() {
            Some(count) => MIN_RESPONSE_LEN + 2 * count as usize,
            None => REQUEST_FRAME_LEN,
        }
    }
}

/// A received response frame whose CRC has been verified.
///
/// Owns its bytes, so it outlives the receive buffer it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: ArrayVec<u8, MAX_FRAME_LEN>,
    crc: u16,
}

impl Response {
    pub fn address(&self) -> u8 {
        self.bytes[0]
    }

    pub fn function(&self) -> u8 {
        self.bytes[1]
    }

    /// Third byte: the byte count of a read reply, or the exception code.
    pub fn byte_count(&self) -> u8 {
        self.bytes[2]
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    pub fn is_exception(&self) -> bool {
        is_exception(self.function())
    }

    /// Exception code, if the slave rejected the request.
    pub fn exception_code(&self) -> Option<u8> {
        self.is_exception().then(|| self.bytes[2])
    }

    /// Entire frame including the CRC.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes between the function code and the CRC.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..self.bytes.len() - 2]
    }

    /// Extracts `count` big-endian register values starting at byte 3.
    pub fn register_values<E: Debug>(&self, count: usize) -> Result<RegisterValues, ModbusError<E>> {
        if count > MAX_READ_REGISTERS as usize {
            return Err(ModbusError::BufferOverflow { needed: count, got: MAX_READ_REGISTERS as usize });
        }
        let end = 3 + 2 * count;
        if self.bytes.len() < end + 2 {
            return Err(ModbusError::MalformedFrame { len: self.bytes.len() });
        }
        Ok(self.bytes[3..end]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Register address and value echoed by a write-single reply.
    pub fn write_echo<E: Debug>(&self) -> Result<(u16, u16), ModbusError<E>> {
        if self.bytes.len() != REQUEST_FRAME_LEN {
            return Err(ModbusError::MalformedFrame { len: self.bytes.len() });
        }
        let register = u16::from_be_bytes([self.bytes[2], self.bytes[3]]);
        let value = u16::from_be_bytes([self.bytes[4], self.bytes[5]]);
        Ok((register, value))
    }
}

/// Parses a complete received frame: length check, then CRC.
///
/// Anything that passes the CRC is returned, including exception replies;
/// matching it against the request is left to the caller.
pub fn parse_response<E: Debug>(frame: &[u8]) -> Result<Response, ModbusError<E>> {
    if frame.len() < MIN_RESPONSE_LEN {
        return Err(ModbusError::MalformedFrame { len: frame.len() });
    }
    let mut bytes = ArrayVec::new();
    bytes
        .try_extend_from_slice(frame)
        .map_err(|_| ModbusError::BufferOverflow { needed: frame.len(), got: MAX_FRAME_LEN })?;
    verify_frame_crc(frame)?;
    let crc = decode_crc([frame[frame.len() - 2], frame[frame.len() - 1]]);
    Ok(Response { bytes, crc })
}

/// Builds the reply a slave sends to a register read. Used by simulators and tests.
pub fn encode_register_response(
    slave: SlaveAddr,
    function: FunctionCode,
    values: &[u16],
) -> Result<ArrayVec<u8, MAX_FRAME_LEN>, ModbusError<()>> {
    if values.is_empty() || values.len() > MAX_READ_REGISTERS as usize {
        return Err(ModbusError::InvalidRequest("register count out of range"));
    }
    let mut frame = ArrayVec::<u8, MAX_FRAME_LEN>::new();
    frame.push(slave.as_u8());
    frame.push(function.code());
    frame.push((values.len() * 2) as u8);
    for value in values {
        // Capacity: 3 + 250 + 2 <= 256
        let _ = frame.try_extend_from_slice(&value.to_be_bytes());
    }
    let crc = crc16(&frame);
    let _ = frame.try_extend_from_slice(&encode_crc(crc));
    Ok(frame)
}

/// Builds an exception reply. Used by simulators and tests.
pub fn encode_exception_response(slave: SlaveAddr, function: FunctionCode, code: u8) -> [u8; MIN_RESPONSE_LEN] {
    let mut frame = [slave.as_u8(), function.exception_code(), code, 0, 0];
    let crc = crc16(&frame[..3]);
    frame[3..].copy_from_slice(&encode_crc(crc));
    frame
}
