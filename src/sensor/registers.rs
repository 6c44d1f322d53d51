// src/sensor/registers.rs

// Input registers (function 0x04). IRn in the datasheet is address n - 1.

/// Meter status bit field (IR1).
pub const METER_STATUS: u16 = 0x0000;
/// Alarm status (IR2).
pub const ALARM_STATUS: u16 = 0x0001;
/// Output status (IR3).
pub const OUTPUT_STATUS: u16 = 0x0002;
/// CO2 concentration in ppm (IR4).
pub const CO2_CONCENTRATION: u16 = 0x0003;
/// Sensor type ID, high word (IR26).
pub const SENSOR_TYPE_HIGH: u16 = 0x0019;
/// Sensor type ID, low word (IR27).
pub const SENSOR_TYPE_LOW: u16 = 0x001A;
/// Firmware version (IR29).
pub const FIRMWARE_VERSION: u16 = 0x001C;

// Holding registers (functions 0x03 / 0x06).

pub const SINGLE_POINT_CALIBRATION: u16 = 0x0010;
pub const BACKGROUND_CALIBRATION: u16 = 0x0011;
pub const ZERO_CALIBRATION: u16 = 0x0012;
/// Automatic baseline correction on/off.
pub const AUTO_CALIBRATION: u16 = 0x0013;
pub const ALARM_THRESHOLD: u16 = 0x0014;

/// Command values for the calibration registers.
pub const COMMAND_START: u16 = 0x0001;
pub const COMMAND_STOP: u16 = 0x0000;
