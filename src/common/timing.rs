// src/common/timing.rs

use core::time::Duration;

// The sensor link runs at 9600 baud, 8N1.
// 1 start bit + 8 data bits + 1 stop bit = 10 bits per byte
// Time per byte = 10 / 9600 s = 1.0417 ms

/// Line speed of the sensor UART.
pub const BAUD_RATE: u32 = 9600;
/// Nominal duration of a single byte (10 bits total) at 9600 baud.
pub const BYTE_DURATION: Duration = Duration::from_micros(1042);

/// Maximum wait for a response, measured from the end of the request write.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(180);

/// Line silence that ends a frame once at least one byte has arrived.
/// Modbus asks for 3.5 character times (about 3.6 ms here); rounded up.
pub const INTER_FRAME_SILENCE: Duration = Duration::from_millis(5);

/// Extra time on top of the nominal transmit time before a write is declared incomplete.
pub const WRITE_ALLOWANCE: Duration = Duration::from_millis(20);

/// Back-off between attempts when the transmitter reports it is busy.
pub const WRITE_RETRY_DELAY_US: u32 = 100;

/// Upper bound on bytes discarded from the receive side before a request.
pub const STALE_DRAIN_LIMIT: usize = 1024;

/// Total time budget for transmitting `len` bytes.
pub const fn write_budget(len: usize) -> Duration {
    let nominal_us = BYTE_DURATION.as_micros() as u64 * len as u64;
    Duration::from_micros(nominal_us + WRITE_ALLOWANCE.as_micros() as u64)
}
