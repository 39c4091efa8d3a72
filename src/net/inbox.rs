use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::{io::AsyncReadExt, net::tcp::OwnedReadHalf};

use crate::errors::NetError;

// -----------------------------------------------------------------------------
// ----- Inbox -----------------------------------------------------------------

/// Buffered read side of a connection. Reads land in one growing buffer and
/// framed units are split off the front, so a single syscall can serve several
/// headers, bodies or raw bytes.
pub(crate) struct Inbox {
    reader: OwnedReadHalf,
    buffer: BytesMut,
    capacity_hint: usize,
    peer: SocketAddr,
}

impl Inbox {
    pub(crate) fn new(reader: OwnedReadHalf, capacity_hint: usize, peer: SocketAddr) -> Self {
        let capacity_hint = capacity_hint.max(1);
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity_hint),
            capacity_hint,
            peer,
        }
    }

    /// Wait until `n` bytes are buffered and split them off.
    /// EOF before that point is a `PeerClosed` error.
    pub(crate) async fn take(&mut self, n: usize) -> Result<Bytes, NetError> {
        while self.buffer.len() < n {
            let missing = n - self.buffer.len();
            self.buffer.reserve(missing.max(self.capacity_hint));

            let read = self.reader.read_buf(&mut self.buffer).await?;
            if read == 0 {
                return Err(NetError::PeerClosed(self.peer));
            }
        }

        Ok(self.buffer.split_to(n).freeze())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
