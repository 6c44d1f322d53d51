// src/common/error.rs

use core::fmt;

/// Which part of a response disagreed with the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// Responding address differs from the addressed slave.
    Address { expected: u8, received: u8 },
    /// Function code differs from the requested one.
    Function { expected: u8, received: u8 },
    /// Byte count of a read reply differs from twice the register count.
    ByteCount { expected: u8, received: u8 },
    /// Echoed register address of a write differs.
    Register { expected: u16, received: u16 },
    /// Echoed value of a write differs.
    Value { expected: u16, received: u16 },
    /// The slave answered with an exception (function code | 0x80).
    Exception { function: u8, code: u8 },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Address { expected, received } => {
                write!(f, "address {:#04x}, expected {:#04x}", received, expected)
            }
            Mismatch::Function { expected, received } => {
                write!(f, "function {:#04x}, expected {:#04x}", received, expected)
            }
            Mismatch::ByteCount { expected, received } => {
                write!(f, "byte count {}, expected {}", received, expected)
            }
            Mismatch::Register { expected, received } => {
                write!(f, "echoed register {:#06x}, expected {:#06x}", received, expected)
            }
            Mismatch::Value { expected, received } => {
                write!(f, "echoed value {:#06x}, expected {:#06x}", received, expected)
            }
            Mismatch::Exception { function, code } => {
                write!(f, "exception {:#04x} for function {:#04x}", code, function)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModbusError<E = ()>
where
    E: core::fmt::Debug,
{
    /// Underlying I/O error from the serial implementation.
    #[error("I/O error: {0:?}")]
    Io(E),

    /// Nothing (or nothing complete) arrived within the response window.
    #[error("No response within the response window")]
    Timeout,

    /// The serial channel accepted fewer bytes than the frame holds.
    #[error("Incomplete write: {written} of {expected} bytes accepted")]
    WriteIncomplete { written: usize, expected: usize },

    /// Received frame is too short (or otherwise unusable) to be a response.
    #[error("Malformed frame ({len} bytes)")]
    MalformedFrame { len: usize },

    /// Received CRC does not match calculated CRC.
    #[error("CRC mismatch: received {received:#06x}, calculated {calculated:#06x}")]
    ChecksumMismatch { received: u16, calculated: u16 },

    /// A well-formed response that does not answer the request.
    #[error("Response does not match request: {0}")]
    ResponseMismatch(Mismatch),

    /// The request cannot be sent as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// Address outside the unicast range and not the "any sensor" address.
    #[error("Invalid slave address: {0:#04x}")]
    InvalidAddress(u8),

    /// Buffer provided was too small.
    #[error("Buffer overflow: needed {needed}, got {got}")]
    BufferOverflow { needed: usize, got: usize },
}

impl<E: core::fmt::Debug> ModbusError<E> {
    /// True when the slave appears to be absent rather than misbehaving.
    pub fn is_no_response(&self) -> bool {
        matches!(self, ModbusError::Timeout | ModbusError::WriteIncomplete { .. })
    }

    /// True when bytes arrived but could not be trusted.
    pub fn is_corrupt_response(&self) -> bool {
        matches!(
            self,
            ModbusError::MalformedFrame { .. } | ModbusError::ChecksumMismatch { .. }
        )
    }

    /// Re-types an error that carries no I/O payload, e.g. a validation failure
    /// produced with `E = ()`.
    pub fn map_io<F, M>(self, map: M) -> ModbusError<F>
    where
        F: core::fmt::Debug,
        M: FnOnce(E) -> F,
    {
        match self {
            ModbusError::Io(e) => ModbusError::Io(map(e)),
            ModbusError::Timeout => ModbusError::Timeout,
            ModbusError::WriteIncomplete { written, expected } => {
                ModbusError::WriteIncomplete { written, expected }
            }
            ModbusError::MalformedFrame { len } => ModbusError::MalformedFrame { len },
            ModbusError::ChecksumMismatch { received, calculated } => {
                ModbusError::ChecksumMismatch { received, calculated }
            }
            ModbusError::ResponseMismatch(m) => ModbusError::ResponseMismatch(m),
            ModbusError::InvalidRequest(why) => ModbusError::InvalidRequest(why),
            ModbusError::InvalidAddress(a) => ModbusError::InvalidAddress(a),
            ModbusError::BufferOverflow { needed, got } => ModbusError::BufferOverflow { needed, got },
        }
    }
}

impl ModbusError<()> {
    /// Lifts an I/O-free error into any error type.
    pub fn widen<F: core::fmt::Debug>(self) -> ModbusError<F> {
        // `()` never reaches the Io arm for errors built by validation code.
        match self {
            ModbusError::Io(()) => ModbusError::InvalidRequest("unexpected I/O error"),
            other => other.map_io(|()| unreachable!()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct MockIoError;

    #[test]
    fn test_classification() {
        assert!(ModbusError::<MockIoError>::Timeout.is_no_response());
        assert!(ModbusError::<MockIoError>::WriteIncomplete { written: 3, expected: 8 }.is_no_response());
        assert!(!ModbusError::<MockIoError>::MalformedFrame { len: 2 }.is_no_response());
        assert!(ModbusError::<MockIoError>::ChecksumMismatch { received: 1, calculated: 2 }.is_corrupt_response());
        assert!(!ModbusError::Io(MockIoError).is_corrupt_response());
    }

    #[test]
    fn test_widen_keeps_variant() {
        let err: ModbusError<MockIoError> = ModbusError::<()>::InvalidAddress(0xFA).widen();
        assert!(matches!(err, ModbusError::InvalidAddress(0xFA)));
        let err: ModbusError<MockIoError> = ModbusError::<()>::InvalidRequest("count").widen();
        assert!(matches!(err, ModbusError::InvalidRequest("count")));
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_display() {
        let err = ModbusError::<MockIoError>::ResponseMismatch(Mismatch::Address { expected: 0xFE, received: 0x01 });
        assert_eq!(err.to_string(), "Response does not match request: address 0x01, expected 0xfe");
        let err = ModbusError::<MockIoError>::ChecksumMismatch { received: 0xD5C5, calculated: 0x1234 };
        assert_eq!(err.to_string(), "CRC mismatch: received 0xd5c5, calculated 0x1234");
    }
}
