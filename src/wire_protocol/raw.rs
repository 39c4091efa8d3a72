use bytes::Bytes;
use std::convert::Infallible;

use super::WireProtocol;

// -----------------------------------------------------------------------------
// ----- Raw -------------------------------------------------------------------

/// Passthrough protocol with no header: connections using it run in raw mode and
/// `serialize` hands the bytes through untouched.
///
/// Mostly useful as the protocol type parameter of a `SimpleNet` that only ever
/// moves raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Raw;

impl WireProtocol for Raw {
    type Header = ();
    type Message = Bytes;
    type Error = Infallible;

    fn header_len(&self) -> usize {
        0
    }

    fn body_len(&self, _header: &[u8]) -> Result<((), usize), Infallible> {
        Ok(((), 0))
    }

    fn parse(&self, _header: (), body: Bytes) -> Result<Bytes, Infallible> {
        Ok(body)
    }

    fn serialize(&self, message: &Bytes) -> Result<Bytes, Infallible> {
        Ok(message.clone())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
