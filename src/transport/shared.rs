// src/transport/shared.rs

use super::{Exchange, RtuTransport};
use crate::common::{
    error::ModbusError,
    frame::{Request, Response},
    hal_traits::{ModbusSerial, ModbusTimer},
};
use std::sync::{Arc, Mutex, MutexGuard};

/// A transport handle that can be cloned across threads.
///
/// Every exchange takes the line lock before writing and releases it only
/// after the response window closes, so requests from different handles never
/// interleave on the wire. The lock is not reentrant: calling back into
/// [`SharedTransport::with_transport`] from inside the closure deadlocks.
pub struct SharedTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    inner: Arc<Mutex<RtuTransport<IF>>>,
}

impl<IF> Clone for SharedTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    fn clone(&self) -> Self {
        SharedTransport { inner: Arc::clone(&self.inner) }
    }
}

impl<IF> SharedTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    pub fn new(transport: RtuTransport<IF>) -> Self {
        SharedTransport { inner: Arc::new(Mutex::new(transport)) }
    }

    /// Runs `f` with exclusive access to the underlying transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut RtuTransport<IF>) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    fn lock(&self) -> MutexGuard<'_, RtuTransport<IF>> {
        // Each exchange drains stale input first, so a panic mid-exchange
        // leaves nothing the next one relies on.
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("Transport lock poisoned by a panicked holder, recovering");
            poisoned.into_inner()
        })
    }
}

impl<IF> Exchange for SharedTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    type Error = IF::Error;

    fn exchange(&mut self, request: &Request) -> Result<Response, ModbusError<IF::Error>> {
        self.lock().exchange(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlaveAddr;
    use crate::transport::mock::MockInterface;
    use std::thread;

    #[test]
    fn test_concurrent_exchanges_never_interleave() {
        let mut mock = MockInterface::new();
        mock.auto_reply = true;
        mock.reply_delay_us = 15_000;
        let shared = SharedTransport::new(RtuTransport::new(mock));

        let handles: Vec<_> = [0x0003u16, 0x0019, 0x001C]
            .into_iter()
            .map(|start| {
                let mut handle = shared.clone();
                thread::spawn(move || {
                    for _ in 0..40 {
                        let request = Request::ReadInputRegisters { slave: SlaveAddr::ANY, start, count: 2 };
                        let response = handle.exchange(&request).expect("exchange");
                        let values = response.register_values::<()>(2).expect("values");
                        assert_eq!(values.as_slice(), &[start, start + 1]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker panicked");
        }

        shared.with_transport(|transport| {
            assert_eq!(transport.interface().garbled_requests, 0);
            assert_eq!(transport.interface().auto_replies, 120);
        });
    }

    #[test]
    fn test_lock_survives_poison() {
        let mut mock = MockInterface::new();
        mock.auto_reply = true;
        let shared = SharedTransport::new(RtuTransport::new(mock));

        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            poisoner.with_transport(|_| panic!("boom"));
        })
        .join();

        let mut handle = shared.clone();
        let request = Request::ReadInputRegisters { slave: SlaveAddr::ANY, start: 3, count: 1 };
        assert!(handle.exchange(&request).is_ok());
    }
}
