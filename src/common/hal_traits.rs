// src/common/hal_traits.rs

use core::fmt::Debug;
use core::ops::{Add, Sub};
use core::time::Duration;

/// A point in time from a monotonic clock.
///
/// Blanket-implemented for anything with the right arithmetic, which includes
/// `std::time::Instant`.
pub trait ModbusInstant:
    Copy + Ord + Add<Duration, Output = Self> + Sub<Self, Output = Duration>
{
}

impl<T> ModbusInstant for T where
    T: Copy + Ord + Add<Duration, Output = T> + Sub<T, Output = Duration>
{
}

/// Abstraction for the monotonic timer and delays the transport needs.
pub trait ModbusTimer {
    type Instant: ModbusInstant;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Blocks for no less than `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Blocks for no less than `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1000);
        }
    }
}

/// Abstraction for the half-duplex byte channel to the sensor.
pub trait ModbusSerial {
    /// Error raised by the UART driver.
    type Error: Debug;

    /// Takes one received byte, or `WouldBlock` when the receive buffer is empty.
    fn read_byte(&mut self) -> nb::Result<u8, Self::Error>;

    /// Queues one byte for transmission, or `WouldBlock` while the transmit buffer is full.
    fn write_byte(&mut self, byte: u8) -> nb::Result<(), Self::Error>;

    /// Completes once every queued byte has left the shift register, so the
    /// line can be turned around for the reply.
    fn flush(&mut self) -> nb::Result<(), Self::Error>;

    /// Blocks until at least one byte can be read or `timeout` elapses.
    ///
    /// Returns `Ok(true)` when data is ready and `Ok(false)` on timeout. This is
    /// the receive notification: implementations should park on an interrupt,
    /// semaphore or `poll(2)` rather than spin.
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, Self::Error>;
}
