// src/sensor/mod.rs

// Register client for Senseair S8-family CO2 sensors.

mod client;
pub mod reading;
pub mod registers;

// --- Public Re-exports ---
pub use client::S8Sensor;
pub use reading::{Co2Reading, DeviceInfo};
pub use self_test::SelfTestReport;
