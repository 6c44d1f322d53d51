// src/sensor/reading.rs

use core::fmt;

/// Highest concentration the sensor reports as a real measurement.
pub const MAX_VALID_PPM: u16 = 10_000;

/// Alarm threshold used when nothing else is configured.
pub const DEFAULT_ALARM_THRESHOLD_PPM: u16 = 1_000;

/// One CO2 measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Co2Reading {
    pub co2_ppm: u16,
    /// Concentration is at or above the alarm threshold.
    pub alarm: bool,
    /// Wall-clock time (Unix seconds) the reading was taken at, as supplied by the caller.
    pub captured_at: i64,
    /// Value lies inside the sensor's measuring range.
    pub valid: bool,
}

impl Co2Reading {
    pub fn new(co2_ppm: u16, alarm_threshold_ppm: u16, captured_at: i64) -> Self {
        Co2Reading {
            co2_ppm,
            alarm: co2_ppm >= alarm_threshold_ppm,
            captured_at,
            valid: co2_ppm <= MAX_VALID_PPM,
        }
    }
}

/// Identification registers of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// `(high << 16) | low` of the type-ID registers.
    pub sensor_type: u32,
    pub firmware_version: u16,
}

impl DeviceInfo {
    pub fn from_registers(type_high: u16, type_low: u16, firmware_version: u16) -> Self {
        DeviceInfo {
            sensor_type: (u32::from(type_high) << 16) | u32::from(type_low),
            firmware_version,
        }
    }

    /// Major/minor split of the firmware register (high byte, low byte).
    pub fn firmware_major_minor(&self) -> (u8, u8) {
        let [major, minor] = self.firmware_version.to_be_bytes();
        (major, minor)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.firmware_major_minor();
        write!(f, "type 0x{:08X}, firmware {}.{}", self.sensor_type, major, minor)
    }
}
