// src/common/function.rs

use core::convert::TryFrom;

/// Bit set in the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Modbus function codes used to talk to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleRegister = 0x06,
}

impl FunctionCode {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// The code a slave replies with when it rejects this function.
    #[inline]
    pub const fn exception_code(self) -> u8 {
        self.code() | EXCEPTION_FLAG
    }

    #[inline]
    pub const fn is_read(self) -> bool {
        matches!(self, FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters)
    }
}

/// True if `code` (as received) marks an exception response.
#[inline]
pub const fn is_exception(code: u8) -> bool {
    code & EXCEPTION_FLAG != 0
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            0x06 => Ok(FunctionCode::WriteSingleRegister),
            other => Err(other),
        }
    }
}
