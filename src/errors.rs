use std::{error::Error as StdError, io, net::SocketAddr};

use thiserror::Error;

use crate::net::{ConnectionId, ListenerId};

// -----------------------------------------------------------------------------
// ----- NetError --------------------------------------------------------------

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("socket i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("peer {0} closed the connection")]
    PeerClosed(SocketAddr),

    #[error("protocol error: {0}")]
    Protocol(#[source] BoxError),

    #[error("frame body of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("unexpected payload: connection expects {expected}")]
    PayloadMismatch { expected: &'static str },

    #[error("outbound queue of {0} is full")]
    OutboundFull(ConnectionId),

    #[error("connection {0} is broken")]
    ConnectionBroken(ConnectionId),

    #[error("listener {0} is broken")]
    ListenerBroken(ListenerId),

    #[error("simplenet destroyed")]
    Destroyed,
}

// -----------------------------------------------------------------------------
// ----- NetError: Static ------------------------------------------------------

impl NetError {
    pub fn protocol<E: Into<BoxError>>(err: E) -> Self {
        NetError::Protocol(err.into())
    }

    /// True for failures caused by the remote end rather than by local misuse.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            NetError::Io(_)
                | NetError::PeerClosed(_)
                | NetError::Protocol(_)
                | NetError::FrameTooLarge { .. }
        )
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
