// src/transport/mod.rs

mod io_helpers;
mod transaction;

#[cfg(feature = "std")]
mod shared;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "std")]
pub use shared::SharedTransport;

use crate::common::{
    error::ModbusError,
    frame::{Request, Response},
    hal_traits::{ModbusSerial, ModbusTimer},
    timing,
};
use core::fmt::Debug;
use core::time::Duration;

/// One request/response round trip with a slave.
///
/// Implementations own the line for the whole exchange: no other request may
/// be written between this request and its response.
pub trait Exchange {
    type Error: Debug;

    fn exchange(&mut self, request: &Request) -> Result<Response, ModbusError<Self::Error>>;
}

impl<T: Exchange + ?Sized> Exchange for &mut T {
    type Error = T::Error;

    fn exchange(&mut self, request: &Request) -> Result<Response, ModbusError<Self::Error>> {
        (**self).exchange(request)
    }
}

/// Modbus-RTU master over a single half-duplex serial line.
pub struct RtuTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    interface: IF,
    response_timeout: Duration,
    last_exchange: Option<IF::Instant>,
}

impl<IF> RtuTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    pub fn new(interface: IF) -> Self {
        RtuTransport {
            interface,
            response_timeout: timing::RESPONSE_TIMEOUT,
            last_exchange: None,
        }
    }

    /// Overrides the 180 ms response window.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn interface(&self) -> &IF {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut IF {
        &mut self.interface
    }

    /// Gives the serial interface back.
    pub fn release(self) -> IF {
        self.interface
    }
}
