// src/lib.rs

#![cfg_attr(not(feature = "std"), no_std)]

pub mod common;
pub mod sensor;
pub mod transport;

#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod session;

// Re-export key types for convenience
pub use common::{ModbusError, Request, Response, SlaveAddr};
pub use sensor::{Co2Reading, S8Sensor};
pub use transport::{Exchange, RtuTransport};

#[cfg(feature = "std")]
pub use config::MonitorConfig;
#[cfg(feature = "std")]
pub use session::{Monitor, SamplingTask, StateStore};
#[cfg(feature = "std")]
pub use transport::SharedTransport;
