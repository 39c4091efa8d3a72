//! net/registry.rs
//!
//! `SimpleNet`: owns the event queue, the listeners and the dialed connections.
//! Callers drive everything through `poll_event`.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    net::{TcpSocket, TcpStream, lookup_host},
    select,
    sync::{self, mpsc, watch},
    time,
};
use tracing::{debug, info};

use super::{Connection, Event, Listener, ListenerId, UserData, conn_set::ConnectionSet};
use crate::config::NetConfig;
use crate::errors::NetError;
use crate::wire_protocol::{Payload, WireProtocol};

// -----------------------------------------------------------------------------
// ----- Shared ----------------------------------------------------------------

/// State every listener and connection needs a handle on.
pub(crate) struct Shared<P: WireProtocol, U> {
    config: NetConfig,
    events: mpsc::Sender<Event<P, U>>,
    next_id: AtomicU64,
}

impl<P: WireProtocol, U> Shared<P, U> {
    pub(crate) fn config(&self) -> &NetConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> mpsc::Sender<Event<P, U>> {
        self.events.clone()
    }

    /// Connection and listener ids come from the same counter, starting at 1.
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// -----------------------------------------------------------------------------
// ----- SimpleNet -------------------------------------------------------------

pub struct SimpleNet<P: WireProtocol, U = ()> {
    shared: Arc<Shared<P, U>>,
    events_rx: sync::Mutex<mpsc::Receiver<Event<P, U>>>,
    destroyed: watch::Sender<bool>,

    listeners: Mutex<HashMap<ListenerId, Arc<Listener<P, U>>>>,
    connections: Arc<ConnectionSet<P, U>>,

    user_data: UserData<U>,
}

// -----------------------------------------------------------------------------
// ----- SimpleNet: Static -----------------------------------------------------

impl<P, U> SimpleNet<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    pub fn new(config: NetConfig) -> Self {
        let config = config.normalized();
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let (destroyed, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                config,
                events: events_tx,
                next_id: AtomicU64::new(0),
            }),
            events_rx: sync::Mutex::new(events_rx),
            destroyed,
            listeners: Mutex::new(HashMap::new()),
            connections: Arc::new(ConnectionSet::new()),
            user_data: UserData::new(),
        }
    }
}

impl<P, U> Default for SimpleNet<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(NetConfig::default())
    }
}

// -----------------------------------------------------------------------------
// ----- SimpleNet: Public -----------------------------------------------------

impl<P, U> SimpleNet<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    /// Bind `addr` and start accepting. Every accepted connection uses `protocol`,
    /// or raw mode when it is `None`.
    pub async fn listen(
        &self,
        addr: &str,
        protocol: Option<Arc<P>>,
    ) -> Result<Arc<Listener<P, U>>, NetError> {
        self.ensure_alive()?;

        let socket = self.bind(addr).await.map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let id = ListenerId(self.shared.next_id());
        let listener = Listener::spawn(id, socket, protocol, self.shared.clone())
            .map_err(|source| NetError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        self.listeners.lock().insert(id, listener.clone());

        info!(listener = %id, addr = %listener.local_address(), "listening");
        Ok(listener)
    }

    /// Dial `addr`. The connection is returned directly; no `NewConnection` event
    /// is emitted for it.
    pub async fn connect(
        &self,
        addr: &str,
        protocol: Option<Arc<P>>,
    ) -> Result<Arc<Connection<P, U>>, NetError> {
        self.ensure_alive()?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| NetError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        let pending = Connection::open(&self.shared, stream, &self.connections, None, protocol)
            .map_err(|source| NetError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        let conn = pending.connection().clone();
        self.connections.insert(conn.clone());
        pending.start();

        // destroy may have run while we were dialing
        if self.is_destroyed() {
            conn.discard();
            return Err(NetError::Destroyed);
        }

        debug!(conn = %conn.id(), peer = %conn.remote_address(), "connected");
        Ok(conn)
    }

    /// Wait up to `timeout` for the next event. An idle wait yields
    /// `Event::Timeout`; once destroyed this returns `NetError::Destroyed`.
    pub async fn poll_event(&self, timeout: Duration) -> Result<Event<P, U>, NetError> {
        let mut destroyed = self.destroyed.subscribe();
        if *destroyed.borrow_and_update() {
            return Err(NetError::Destroyed);
        }

        let next = async {
            let mut rx = self.events_rx.lock().await;
            if *destroyed.borrow() {
                rx.close();
                return None;
            }

            select! {
                biased;
                _ = destroyed.wait_for(|d| *d) => {
                    rx.close();
                    None
                }
                event = rx.recv() => event,
            }
        };

        match time::timeout(timeout, next).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(NetError::Destroyed),
            Err(_) => Ok(Event::Timeout),
        }
    }

    pub async fn send_data(
        &self,
        conn: &Connection<P, U>,
        payload: Payload<P::Message>,
    ) -> Result<(), NetError> {
        self.ensure_alive()?;
        conn.send(payload).await
    }

    /// Non-waiting `send_data`. A connection whose peer stops reading fills its
    /// outbound queue and yields `NetError::OutboundFull`.
    pub fn try_send_data(
        &self,
        conn: &Connection<P, U>,
        payload: Payload<P::Message>,
    ) -> Result<(), NetError> {
        self.ensure_alive()?;
        conn.try_send(payload)
    }

    /// Tear a connection down, emitting `ConnectionClosed`. Closing a connection that
    /// is already broken does nothing.
    pub fn close_conn(&self, conn: &Arc<Connection<P, U>>) -> Result<(), NetError> {
        conn.close();
        Ok(())
    }

    /// Close every child of `listener` (one `ConnectionClosed` each), stop its accept
    /// task and release the socket.
    pub async fn close_listen(&self, listener: &Arc<Listener<P, U>>) -> Result<(), NetError> {
        self.listeners.lock().remove(&listener.id());

        if listener.close().await {
            Ok(())
        } else {
            Err(NetError::ListenerBroken(listener.id()))
        }
    }

    /// Close the event queue and tear down every listener and dialed connection.
    /// Calling it again does nothing.
    pub async fn destroy(&self) {
        if self.destroyed.send_replace(true) {
            return;
        }

        // a poller holding the lock lets go as soon as it sees the flag
        self.events_rx.lock().await.close();

        for conn in self.connections.snapshot() {
            conn.close();
        }

        let listeners: Vec<_> = self.listeners.lock().drain().map(|(_, l)| l).collect();
        for listener in listeners {
            listener.close().await;
        }

        info!("simplenet destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    /// Dialed connections that are still alive, sorted by id.
    pub fn connections(&self) -> Vec<Arc<Connection<P, U>>> {
        self.connections.snapshot()
    }

    /// Open listeners, sorted by id.
    pub fn listeners(&self) -> Vec<Arc<Listener<P, U>>> {
        let mut listeners: Vec<_> = self.listeners.lock().values().cloned().collect();
        listeners.sort_by_key(|l| l.id());
        listeners
    }

    pub fn config(&self) -> &NetConfig {
        self.shared.config()
    }

    pub fn user_data(&self) -> &UserData<U> {
        &self.user_data
    }
}

// -----------------------------------------------------------------------------
// ----- SimpleNet: Private ----------------------------------------------------

impl<P, U> SimpleNet<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    fn ensure_alive(&self) -> Result<(), NetError> {
        if self.is_destroyed() {
            Err(NetError::Destroyed)
        } else {
            Ok(())
        }
    }

    async fn bind(&self, addr: &str) -> std::io::Result<tokio::net::TcpListener> {
        let addr: SocketAddr = lookup_host(addr).await?.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "address resolved to nothing")
        })?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;

        socket.listen(self.shared.config().listen_backlog)
    }
}

impl<P: WireProtocol, U> Drop for SimpleNet<P, U> {
    // Nothing can be awaited here: signal every task and drop sockets without
    // reporting events.
    fn drop(&mut self) {
        if self.destroyed.send_replace(true) {
            return;
        }

        self.events_rx.get_mut().close();

        for conn in self.connections.snapshot() {
            conn.discard();
        }

        for (_, listener) in self.listeners.get_mut().drain() {
            listener.abandon();
        }
    }
}

impl<P: WireProtocol, U> fmt::Debug for SimpleNet<P, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNet")
            .field("destroyed", &*self.destroyed.borrow())
            .field("listeners", &self.listeners.lock().len())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
