// src/common/mod.rs

// --- Declare all public modules within common ---
pub mod address;
pub mod crc;
pub mod error;
pub mod frame;
pub mod function;
pub mod hal_traits;
pub mod timing;

// --- Re-export key types/traits/functions for easier access ---

// From address.rs
pub use address::SlaveAddr;

// From crc.rs
pub use crc::{crc16, crc32, decode_crc, encode_crc, verify_frame_crc};

// From error.rs
pub use error::{Mismatch, ModbusError};

// From frame.rs
pub use frame::{
    encode_exception_response, encode_register_response, parse_response, RegisterValues, Request,
    Response, MAX_FRAME_LEN, MAX_READ_REGISTERS, MIN_RESPONSE_LEN, REQUEST_FRAME_LEN,
};

// From function.rs
pub use function::FunctionCode;

// From hal_traits.rs
pub use hal_traits::{ModbusInstant, ModbusSerial, ModbusTimer};

// timing.rs constants stay namespaced: common::timing::RESPONSE_TIMEOUT etc.
