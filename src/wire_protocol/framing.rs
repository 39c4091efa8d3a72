use bytes::Bytes;
use std::error::Error as StdError;

use crate::net::ConnectionInfo;

// -----------------------------------------------------------------------------
// ----- WireProtocol ----------------------------------------------------------

/// Fixed-header framing supplied by the caller.
///
/// A framed unit is `header_len()` bytes of header followed by a body whose length
/// the header encodes. A `header_len()` of zero puts connections in raw mode, where
/// every received byte is delivered on its own.
///
/// Implementations are shared by every connection of a listener, so they must not
/// keep per-connection state.
pub trait WireProtocol: Send + Sync + 'static {
    /// Whatever `body_len` decoded from the header, handed back to `parse`.
    type Header: Send + 'static;

    /// The application message surfaced in `Event::NewData`.
    type Message: Send + Sync + 'static;

    type Error: StdError + Send + Sync + 'static;

    fn header_len(&self) -> usize;

    /// Decode a header of exactly `header_len()` bytes, returning the body length.
    fn body_len(&self, header: &[u8]) -> Result<(Self::Header, usize), Self::Error>;

    fn parse(&self, header: Self::Header, body: Bytes) -> Result<Self::Message, Self::Error>;

    /// Produce header + body. The encoded length must match the body actually written.
    fn serialize(&self, message: &Self::Message) -> Result<Bytes, Self::Error>;

    /// Called once per accepted socket before any event is emitted for it.
    fn accept_filter(&self, _conn: &ConnectionInfo) -> bool {
        true
    }
}

// -----------------------------------------------------------------------------
// ----- Payload ---------------------------------------------------------------

/// Data travelling through a connection: raw bytes in raw mode, protocol messages
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<M> {
    Raw(Bytes),
    Message(M),
}

impl<M> Payload<M> {
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Payload::Raw(bytes.into())
    }

    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Payload::Raw(bytes) => Some(bytes),
            Payload::Message(_) => None,
        }
    }

    pub fn into_message(self) -> Option<M> {
        match self {
            Payload::Raw(_) => None,
            Payload::Message(message) => Some(message),
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
