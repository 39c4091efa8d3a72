use parking_lot::Mutex;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use tokio::{net::TcpListener, select, sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{
    Connection, Event, ListenerId, UserData, conn_set::ConnectionSet, registry::Shared,
};
use crate::wire_protocol::WireProtocol;

// -----------------------------------------------------------------------------
// ----- Listener --------------------------------------------------------------

/// A bound socket plus the connections it accepted.
pub struct Listener<P: WireProtocol, U = ()> {
    id: ListenerId,
    status: AtomicU8,
    local_addr: SocketAddr,
    protocol: Option<Arc<P>>,

    children: Arc<ConnectionSet<P, U>>,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,

    user_data: UserData<U>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerStatus {
    Listening = 1,
    Broken = 2,
}

impl ListenerStatus {
    fn from_u8(raw: u8) -> Self {
        if raw == ListenerStatus::Listening as u8 {
            ListenerStatus::Listening
        } else {
            ListenerStatus::Broken
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Listener: Static ------------------------------------------------------

impl<P, U> Listener<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    /// Wrap a bound socket and spawn its accept task.
    pub(crate) fn spawn(
        id: ListenerId,
        socket: TcpListener,
        protocol: Option<Arc<P>>,
        shared: Arc<Shared<P, U>>,
    ) -> std::io::Result<Arc<Self>> {
        let local_addr = socket.local_addr()?;
        let (shutdown, _) = watch::channel(false);

        let listener = Arc::new(Listener {
            id,
            status: AtomicU8::new(ListenerStatus::Listening as u8),
            local_addr,
            protocol,
            children: Arc::new(ConnectionSet::new()),
            shutdown,
            accept_task: Mutex::new(None),
            user_data: UserData::new(),
        });

        let handle = tokio::spawn(listener.clone().accept_loop(socket, shared));
        *listener.accept_task.lock() = Some(handle);

        Ok(listener)
    }
}

// -----------------------------------------------------------------------------
// ----- Listener: Public ------------------------------------------------------

impl<P: WireProtocol, U> Listener<P, U> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_listening(&self) -> bool {
        self.status() == ListenerStatus::Listening
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn protocol(&self) -> Option<&Arc<P>> {
        self.protocol.as_ref()
    }

    /// Live accepted connections.
    pub fn connection_count(&self) -> usize {
        self.children.len()
    }

    pub fn connections(&self) -> Vec<Arc<Connection<P, U>>> {
        self.children.snapshot()
    }

    pub fn user_data(&self) -> &UserData<U> {
        &self.user_data
    }
}

// -----------------------------------------------------------------------------
// ----- Listener: Teardown ----------------------------------------------------

impl<P, U> Listener<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    /// Close every child, stop accepting and release the socket. Returns false if
    /// the listener was already broken.
    pub(crate) async fn close(&self) -> bool {
        if !self.mark_broken() {
            return false;
        }

        self.close_children();

        self.shutdown.send_replace(true);
        let handle = self.accept_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        // a socket accepted right before shutdown may have slipped in
        self.close_children();

        info!(listener = %self.id, addr = %self.local_addr, "listener closed");
        true
    }

    fn close_children(&self) {
        for conn in self.children.snapshot() {
            conn.close();
        }
    }
}

impl<P: WireProtocol, U> Listener<P, U> {
    /// Synchronous teardown for a registry being dropped: children go away
    /// silently and the accept task is told to stop, releasing the socket once
    /// it observes the signal.
    pub(crate) fn abandon(&self) {
        self.mark_broken();
        self.shutdown.send_replace(true);

        for conn in self.children.snapshot() {
            conn.discard();
        }
    }

    fn mark_broken(&self) -> bool {
        self.status
            .compare_exchange(
                ListenerStatus::Listening as u8,
                ListenerStatus::Broken as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

// -----------------------------------------------------------------------------
// ----- Listener: Accept loop -------------------------------------------------

impl<P, U> Listener<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    async fn accept_loop(self: Arc<Self>, socket: TcpListener, shared: Arc<Shared<P, U>>) {
        let mut shutdown = self.shutdown.subscribe();
        let events = shared.events();

        loop {
            let accepted = select! {
                biased;
                _ = shutdown.wait_for(|s| *s) => break,
                accepted = socket.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(listener = %self.id, "accept failed: {err}");
                    if !self.is_listening() {
                        break;
                    }
                    continue;
                }
            };

            let pending = match Connection::open(
                &shared,
                stream,
                &self.children,
                Some(self.id),
                self.protocol.clone(),
            ) {
                Ok(pending) => pending,
                Err(err) => {
                    warn!(listener = %self.id, %peer, "failed to set up connection: {err}");
                    continue;
                }
            };

            if let Some(protocol) = self.protocol.as_deref() {
                if !protocol.accept_filter(&pending.info()) {
                    debug!(listener = %self.id, %peer, "connection rejected by accept filter");
                    continue;
                }
            }

            let conn = pending.connection().clone();
            self.children.insert(conn.clone());

            let delivered = select! {
                biased;
                _ = shutdown.wait_for(|s| *s) => false,
                res = events.send(Event::NewConnection(conn.clone())) => res.is_ok(),
            };

            if !delivered {
                conn.discard();
                break;
            }

            debug!(listener = %self.id, conn = %conn.id(), %peer, "accepted connection");
            pending.start();
        }

        debug!(listener = %self.id, "accept loop stopped");
    }
}

impl<P: WireProtocol, U> fmt::Debug for Listener<P, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("local_addr", &self.local_addr)
            .field("connections", &self.children.len())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
