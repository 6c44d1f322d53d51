// src/common/address.rs

use super::error::ModbusError;
use core::convert::TryFrom;
use core::fmt;

/// A Modbus slave address the transport may target.
///
/// Valid values are the unicast range `1..=247` plus `0xFE`, which S8-family
/// sensors answer regardless of their configured address. The Modbus
/// broadcast address `0` is rejected: broadcast requests never get a reply,
/// and every exchange here waits for one.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SlaveAddr(u8);

impl SlaveAddr {
    /// "Any sensor" address. Used when a single sensor sits on the line.
    pub const ANY: SlaveAddr = SlaveAddr(0xFE);

    /// Creates a new `SlaveAddr` if `address` is usable.
    pub fn new(address: u8) -> Result<Self, ModbusError<()>> {
        if Self::is_valid(address) {
            Ok(SlaveAddr(address))
        } else {
            Err(ModbusError::InvalidAddress(address))
        }
    }

    #[inline]
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_any(&self) -> bool {
        self.0 == 0xFE
    }

    #[inline]
    pub const fn is_valid(address: u8) -> bool {
        matches!(address, 1..=247 | 0xFE)
    }
}

impl Default for SlaveAddr {
    fn default() -> Self {
        Self::ANY
    }
}

impl TryFrom<u8> for SlaveAddr {
    type Error = ModbusError<()>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SlaveAddr> for u8 {
    fn from(value: SlaveAddr) -> Self {
        value.0
    }
}

impl fmt::Display for SlaveAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
