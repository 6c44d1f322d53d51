// src/transport/transaction.rs

use super::{Exchange, RtuTransport};
use crate::common::{
    error::ModbusError,
    frame::{parse_response, Request, Response, MAX_FRAME_LEN},
    hal_traits::{ModbusSerial, ModbusTimer},
};

impl<IF> Exchange for RtuTransport<IF>
where
    IF: ModbusSerial + ModbusTimer,
{
    type Error = IF::Error;

    /// Sends `request` and returns the CRC-checked reply.
    ///
    /// The reply is not matched against the request here (address, function,
    /// byte count); that is up to the register client.
    fn exchange(&mut self, request: &Request) -> Result<Response, ModbusError<IF::Error>> {
        request.validate()?;
        let frame = request.encode();

        self.ensure_bus_idle();
        let stale = self.discard_stale_input()?;
        if stale > 0 {
            log::debug!("Discarded {} stale bytes before {:?}", stale, request.function());
        }

        self.send_frame(&frame)?;

        let mut buffer = [0u8; MAX_FRAME_LEN];
        let received = self.read_frame(&mut buffer, request.expected_response_len());
        self.last_exchange = Some(self.interface.now());

        let len = match received {
            Ok(len) => len,
            Err(e) => {
                log::debug!("No usable reply from slave {}: {}", request.slave(), e);
                return Err(e);
            }
        };
        log::trace!("RX {:02X?}", &buffer[..len]);
        parse_response(&buffer[..len])
    }
}
