use std::{fmt, sync::Arc};

use super::Connection;
use crate::errors::NetError;
use crate::wire_protocol::{Payload, WireProtocol};

// -----------------------------------------------------------------------------
// ----- Event -----------------------------------------------------------------

/// Everything a `SimpleNet` reports, in the order it happened per connection.
pub enum Event<P: WireProtocol, U = ()> {
    /// A listener accepted a connection that passed its protocol's filter.
    NewConnection(Arc<Connection<P, U>>),

    /// The connection failed on read, write or framing and is now broken.
    ConnectionError(Arc<Connection<P, U>>, NetError),

    /// The connection was closed locally, directly or through its listener.
    ConnectionClosed(Arc<Connection<P, U>>),

    /// One unit arrived: a single byte in raw mode, one message otherwise.
    NewData(Arc<Connection<P, U>>, Payload<P::Message>),

    /// Nothing arrived within the poll timeout.
    Timeout,
}

impl<P: WireProtocol, U> Event<P, U> {
    /// The connection the event concerns, if any.
    pub fn connection(&self) -> Option<&Arc<Connection<P, U>>> {
        match self {
            Event::NewConnection(conn)
            | Event::ConnectionError(conn, _)
            | Event::ConnectionClosed(conn)
            | Event::NewData(conn, _) => Some(conn),
            Event::Timeout => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewConnection(_) => "new_connection",
            Event::ConnectionError(..) => "connection_error",
            Event::ConnectionClosed(_) => "connection_closed",
            Event::NewData(..) => "new_data",
            Event::Timeout => "timeout",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Event::Timeout)
    }
}

impl<P: WireProtocol, U> fmt::Debug for Event<P, U>
where
    P::Message: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::NewConnection(conn) => f.debug_tuple("NewConnection").field(&conn.id()).finish(),
            Event::ConnectionError(conn, err) => f
                .debug_tuple("ConnectionError")
                .field(&conn.id())
                .field(err)
                .finish(),
            Event::ConnectionClosed(conn) => {
                f.debug_tuple("ConnectionClosed").field(&conn.id()).finish()
            }
            Event::NewData(conn, payload) => f
                .debug_tuple("NewData")
                .field(&conn.id())
                .field(payload)
                .finish(),
            Event::Timeout => f.write_str("Timeout"),
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
