// src/common/crc.rs

use super::error::ModbusError;
use crc::{Algorithm, Crc, CRC_32_ISO_HDLC};

/// CRC-16/MODBUS: reflected 0xA001 (0x8005 unreflected) seeded with 0xFFFF,
/// no final xor. `check` is the CRC of ASCII "123456789".
pub const MODBUS_CRC: Algorithm<u16> = Algorithm {
    poly: 0x8005,
    init: 0xFFFF,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0x4B37,
    width: 16,
    residue: 0x0000,
};

const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&MODBUS_CRC);

// Standard CRC-32 (reflected 0xEDB88320 table form), used for persisted records.
const RECORD_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Calculates the Modbus CRC-16 of `data` in wire order.
///
/// CRC-16/MODBUS is sent low byte first. The value returned here has its
/// bytes swapped, so that `to_be_bytes()` yields the bytes exactly as they
/// appear on the wire. For `FE 04 00 03 00 01` the wire bytes are `D5 C5`
/// and this function returns `0xD5C5`.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    FRAME_CRC.checksum(data).swap_bytes()
}

/// Encodes a wire-order CRC (as returned by [`crc16`]) into the two trailing frame bytes.
#[inline]
pub fn encode_crc(crc_value: u16) -> [u8; 2] {
    crc_value.to_be_bytes()
}

/// Decodes the two trailing frame bytes back into a wire-order CRC.
#[inline]
pub fn decode_crc(crc_bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(crc_bytes)
}

/// Checks the trailing CRC of a complete RTU frame.
///
/// Frames shorter than 3 bytes cannot carry a CRC and are `MalformedFrame`.
pub fn verify_frame_crc<E>(frame: &[u8]) -> Result<(), ModbusError<E>>
where
    E: core::fmt::Debug,
{
    if frame.len() < 3 {
        return Err(ModbusError::MalformedFrame { len: frame.len() });
    }
    let data_len = frame.len() - 2;
    let calculated = crc16(&frame[..data_len]);
    let received = decode_crc([frame[data_len], frame[data_len + 1]]);

    if calculated == received {
        Ok(())
    } else {
        Err(ModbusError::ChecksumMismatch { received, calculated })
    }
}

/// CRC-32 (ISO-HDLC: init 0xFFFFFFFF, reflected, final XOR 0xFFFFFFFF).
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    RECORD_CRC.checksum(data)
}
