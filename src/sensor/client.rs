// src/sensor/client.rs

use super::reading::{Co2Reading, DeviceInfo, DEFAULT_ALARM_THRESHOLD_PPM};
use super::registers;
use crate::common::{
    error::{Mismatch, ModbusError},
    frame::{RegisterValues, Request, Response},
    function::EXCEPTION_FLAG,
    SlaveAddr,
};
use crate::transport::Exchange;
use core::fmt::Debug;

/// Register-level client for an S8 CO2 sensor.
///
/// Every reply is checked against its request (address, function, byte
/// count or write echo) before any value is handed out.
pub struct S8Sensor<T: Exchange> {
    transport: T,
    slave: SlaveAddr,
    alarm_threshold_ppm: u16,
}

impl<T: Exchange> S8Sensor<T> {
    pub fn new(transport: T) -> Self {
        S8Sensor {
            transport,
            slave: SlaveAddr::ANY,
            alarm_threshold_ppm: DEFAULT_ALARM_THRESHOLD_PPM,
        }
    }

    pub fn with_slave(mut self, slave: SlaveAddr) -> Self {
        self.slave = slave;
        self
    }

    pub fn with_alarm_threshold(mut self, ppm: u16) -> Self {
        self.alarm_threshold_ppm = ppm;
        self
    }

    pub fn slave(&self) -> SlaveAddr {
        self.slave
    }

    pub fn alarm_threshold_ppm(&self) -> u16 {
        self.alarm_threshold_ppm
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    // --- Generic register access ---

    pub fn read_input_registers(
        &mut self,
        slave: SlaveAddr,
        start: u16,
        count: u16,
    ) -> Result<RegisterValues, ModbusError<T::Error>> {
        self.read_registers(Request::ReadInputRegisters { slave, start, count })
    }

    pub fn read_holding_registers(
        &mut self,
        slave: SlaveAddr,
        start: u16,
        count: u16,
    ) -> Result<RegisterValues, ModbusError<T::Error>> {
        self.read_registers(Request::ReadHoldingRegisters { slave, start, count })
    }

    /// Writes one holding register and checks the slave's echo.
    pub fn write_single_register(
        &mut self,
        slave: SlaveAddr,
        register: u16,
        value: u16,
    ) -> Result<(), ModbusError<T::Error>> {
        let request = Request::WriteSingleRegister { slave, register, value };
        let response = self.transport.exchange(&request)?;
        check_reply(&request, &response)
    }

    fn read_registers(&mut self, request: Request) -> Result<RegisterValues, ModbusError<T::Error>> {
        request.validate()?;
        let response = self.transport.exchange(&request)?;
        check_reply(&request, &response)?;
        response.register_values(request.register_count().unwrap_or(0) as usize)
    }

    fn read_one(&mut self, register: u16) -> Result<u16, ModbusError<T::Error>> {
        let values = self.read_input_registers(self.slave, register, 1)?;
        values.first().copied().ok_or(ModbusError::MalformedFrame { len: 0 })
    }

    // --- Sensor operations ---

    /// Current CO2 concentration in ppm (input register 0x0003).
    pub fn read_co2(&mut self) -> Result<u16, ModbusError<T::Error>> {
        self.read_one(registers::CO2_CONCENTRATION)
    }

    /// Reads CO2 and stamps it with `captured_at`.
    pub fn read_reading(&mut self, captured_at: i64) -> Result<Co2Reading, ModbusError<T::Error>> {
        let ppm = self.read_co2()?;
        Ok(Co2Reading::new(ppm, self.alarm_threshold_ppm, captured_at))
    }

    /// Meter status word (input register 0x0000). Zero means no fault flags set.
    pub fn read_status(&mut self) -> Result<u16, ModbusError<T::Error>> {
        self.read_one(registers::METER_STATUS)
    }

    pub fn read_alarm_status(&mut self) -> Result<u16, ModbusError<T::Error>> {
        self.read_one(registers::ALARM_STATUS)
    }

    pub fn read_output_status(&mut self) -> Result<u16, ModbusError<T::Error>> {
        self.read_one(registers::OUTPUT_STATUS)
    }

    pub fn read_device_info(&mut self) -> Result<DeviceInfo, ModbusError<T::Error>> {
        let type_id = self.read_input_registers(self.slave, registers::SENSOR_TYPE_HIGH, 2)?;
        let firmware = self.read_one(registers::FIRMWARE_VERSION)?;
        Ok(DeviceInfo::from_registers(type_id[0], type_id[1], firmware))
    }

    pub fn single_point_calibration(&mut self, ppm: u16) -> Result<(), ModbusError<T::Error>> {
        self.write_single_register(self.slave, registers::SINGLE_POINT_CALIBRATION, ppm)?;
        log::info!("Single point calibration set to {} ppm", ppm);
        Ok(())
    }

    pub fn background_calibration(&mut self) -> Result<(), ModbusError<T::Error>> {
        self.write_single_register(self.slave, registers::BACKGROUND_CALIBRATION, registers::COMMAND_START)?;
        log::info!("Background calibration started");
        Ok(())
    }

    pub fn zero_calibration(&mut self) -> Result<(), ModbusError<T::Error>> {
        self.write_single_register(self.slave, registers::ZERO_CALIBRATION, registers::COMMAND_START)?;
        log::info!("Zero calibration started");
        Ok(())
    }

    pub fn set_auto_calibration(&mut self, enable: bool) -> Result<(), ModbusError<T::Error>> {
        let command = if enable { registers::COMMAND_START } else { registers::COMMAND_STOP };
        self.write_single_register(self.slave, registers::AUTO_CALIBRATION, command)?;
        log::info!("Auto calibration {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Writes the sensor-side alarm threshold and uses it for readings from now on.
    pub fn set_alarm_threshold(&mut self, ppm: u16) -> Result<(), ModbusError<T::Error>> {
        self.write_single_register(self.slave, registers::ALARM_THRESHOLD, ppm)?;
        self.alarm_threshold_ppm = ppm;
        log::info!("Alarm threshold set to {} ppm", ppm);
        Ok(())
    }
}

/// Matches a CRC-valid reply against the request it answers.
fn check_reply<E: Debug>(request: &Request, response: &Response) -> Result<(), ModbusError<E>> {
    let slave = request.slave().as_u8();
    if response.address() != slave {
        return Err(ModbusError::ResponseMismatch(Mismatch::Address {
            expected: slave,
            received: response.address(),
        }));
    }

    let function = request.function().code();
    if response.function() == function | EXCEPTION_FLAG {
        return Err(ModbusError::ResponseMismatch(Mismatch::Exception {
            function,
            code: response.byte_count(),
        }));
    }
    if response.function() != function {
        return Err(ModbusError::ResponseMismatch(Mismatch::Function {
            expected: function,
            received: response.function(),
        }));
    }

    match *request {
        Request::ReadHoldingRegisters { count, .. } | Request::ReadInputRegisters { count, .. } => {
            let expected = (count * 2) as u8;
            if response.byte_count() != expected {
                return Err(ModbusError::ResponseMismatch(Mismatch::ByteCount {
                    expected,
                    received: response.byte_count(),
                }));
            }
            if response.as_bytes().len() != request.expected_response_len() {
                return Err(ModbusError::MalformedFrame { len: response.as_bytes().len() });
            }
            Ok(())
        }
        Request::WriteSingleRegister { register, value, .. } => {
            let (echo_register, echo_value) = response.write_echo()?;
            if echo_register != register {
                return Err(ModbusError::ResponseMismatch(Mismatch::Register {
                    expected: register,
                    received: echo_register,
                }));
            }
            if echo_value != value {
                return Err(ModbusError::ResponseMismatch(Mismatch::Value {
                    expected: value,
                    received: echo_value,
                }));
            }
            Ok(())
        }
    }
}
