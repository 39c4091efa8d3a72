//! net/conn_set.rs
//!
//! Owner set for connections: a listener's children, or the registry's dialed
//! connections. Connections point back at their set through a `Weak` and remove
//! themselves on teardown.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

use super::{Connection, ConnectionId};
use crate::wire_protocol::WireProtocol;

// -----------------------------------------------------------------------------
// ----- ConnectionSet ---------------------------------------------------------

pub(crate) struct ConnectionSet<P: WireProtocol, U> {
    inner: Mutex<HashMap<ConnectionId, Arc<Connection<P, U>>>>,
}

impl<P: WireProtocol, U> ConnectionSet<P, U> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, conn: Arc<Connection<P, U>>) {
        self.inner.lock().insert(conn.id(), conn);
    }

    /// Returns false if the connection was not a member.
    pub(crate) fn remove(&self, id: ConnectionId) -> bool {
        self.inner.lock().remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Members sorted by id. The lock is released before the caller touches them.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Connection<P, U>>> {
        let mut conns: Vec<_> = self.inner.lock().values().cloned().collect();
        conns.sort_by_key(|c| c.id());
        conns
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
