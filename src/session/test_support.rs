// src/session/test_support.rs

//! Stand-ins for the sensor and the RTC used by the session tests.

use super::clock::Clock;
use crate::common::{
    frame::{encode_register_response, parse_response},
    function::FunctionCode,
    ModbusError, Request, Response,
};
use crate::transport::Exchange;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

/// Sensor answering CO2 reads with a settable value.
#[derive(Clone, Default)]
pub(crate) struct FakeSensor {
    pub ppm: Arc<AtomicU16>,
    pub offline: Arc<AtomicBool>,
    pub reads: Arc<AtomicU32>,
}

impl FakeSensor {
    pub fn reading(ppm: u16) -> Self {
        let sensor = FakeSensor::default();
        sensor.ppm.store(ppm, Ordering::SeqCst);
        sensor
    }

    pub fn set_ppm(&self, ppm: u16) {
        self.ppm.store(ppm, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Exchange for FakeSensor {
    type Error = ();

    fn exchange(&mut self, request: &Request) -> Result<Response, ModbusError<()>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ModbusError::Timeout);
        }
        assert_eq!(request.function(), FunctionCode::ReadInputRegisters);
        self.reads.fetch_add(1, Ordering::SeqCst);
        let ppm = self.ppm.load(Ordering::SeqCst);
        let frame = encode_register_response(request.slave(), FunctionCode::ReadInputRegisters, &[ppm])?;
        parse_response(&frame)
    }
}

/// RTC whose time only moves when told to.
#[derive(Clone)]
pub(crate) struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn at(t: i64) -> Self {
        ManualClock(Arc::new(AtomicI64::new(t)))
    }

    pub fn set(&self, t: i64) {
        self.0.store(t, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// 2025-01-01T00:00:00Z
pub(crate) const JAN_2025: i64 = 1_735_689_600;
