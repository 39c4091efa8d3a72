use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::OwnedWriteHalf},
    runtime::Handle,
    select,
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
};
use tracing::{debug, trace, warn};

use super::{
    ConnectionId, Event, ListenerId, UserData, conn_set::ConnectionSet, inbox::Inbox,
    registry::Shared,
};
use crate::errors::NetError;
use crate::wire_protocol::{Payload, WireProtocol};

// -----------------------------------------------------------------------------
// ----- Connection ------------------------------------------------------------

/// One established socket, inbound or dialed, driven by a reader task and a
/// writer task.
pub struct Connection<P: WireProtocol, U = ()> {
    id: ConnectionId,
    status: AtomicU8,
    listener_id: Option<ListenerId>,
    owner: Weak<ConnectionSet<P, U>>,

    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    last_activity: Mutex<Instant>,

    protocol: Option<Arc<P>>,
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: watch::Sender<bool>,
    events: mpsc::Sender<Event<P, U>>,

    user_data: UserData<U>,
}

// -----------------------------------------------------------------------------
// ----- Connection: SubStructs ------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnStatus {
    Connected = 1,
    Broken = 2,
}

impl ConnStatus {
    fn from_u8(raw: u8) -> Self {
        if raw == ConnStatus::Connected as u8 {
            ConnStatus::Connected
        } else {
            ConnStatus::Broken
        }
    }
}

/// Plain snapshot of a connection's identity, handed to accept filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub listener_id: Option<ListenerId>,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

/// A connection that exists but whose tasks have not been spawned yet.
/// Dropping it closes the socket.
pub(crate) struct PendingConnection<P: WireProtocol, U> {
    conn: Arc<Connection<P, U>>,
    stream: TcpStream,
    outbound_rx: mpsc::Receiver<Bytes>,
    read_capacity: usize,
    max_body_len: usize,
}

// -----------------------------------------------------------------------------
// ----- Connection: Static ----------------------------------------------------

impl<P, U> Connection<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    pub(crate) fn open(
        shared: &Shared<P, U>,
        stream: TcpStream,
        owner: &Arc<ConnectionSet<P, U>>,
        listener_id: Option<ListenerId>,
        protocol: Option<Arc<P>>,
    ) -> std::io::Result<PendingConnection<P, U>> {
        let config = shared.config();
        stream.set_nodelay(config.no_delay)?;

        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
        let (closed, _) = watch::channel(false);

        let conn = Arc::new(Connection {
            id: ConnectionId(shared.next_id()),
            status: AtomicU8::new(ConnStatus::Connected as u8),
            listener_id,
            owner: Arc::downgrade(owner),
            local_addr,
            remote_addr,
            last_activity: Mutex::new(Instant::now()),
            protocol,
            outbound: Mutex::new(Some(outbound_tx)),
            closed,
            events: shared.events(),
            user_data: UserData::new(),
        });

        Ok(PendingConnection {
            conn,
            stream,
            outbound_rx,
            read_capacity: config.read_buffer_capacity,
            max_body_len: config.max_body_len,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Public ----------------------------------------------------

impl<P: WireProtocol, U> Connection<P, U> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn status(&self) -> ConnStatus {
        ConnStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnStatus::Connected
    }

    /// The listener that accepted this connection; `None` for dialed ones.
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.listener_id
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Last time a unit was read or a write completed.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    pub fn protocol(&self) -> Option<&Arc<P>> {
        self.protocol.as_ref()
    }

    pub fn user_data(&self) -> &UserData<U> {
        &self.user_data
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            listener_id: self.listener_id,
            local_addr: self.local_addr,
            remote_addr: self.remote_addr,
        }
    }

    /// Queue a payload for the writer task. Without a protocol only raw bytes are
    /// accepted; with one, only protocol messages, which get serialized here.
    /// Waits while the outbound queue is full.
    pub async fn send(&self, payload: Payload<P::Message>) -> Result<(), NetError> {
        let bytes = self.encode(payload)?;

        let outbound = self.outbound.lock().clone();
        let Some(outbound) = outbound else {
            return Err(NetError::ConnectionBroken(self.id));
        };

        outbound
            .send(bytes)
            .await
            .map_err(|_| NetError::ConnectionBroken(self.id))
    }

    /// Like `send`, but fails with `OutboundFull` instead of waiting for the
    /// writer to catch up.
    pub fn try_send(&self, payload: Payload<P::Message>) -> Result<(), NetError> {
        let bytes = self.encode(payload)?;

        let outbound = self.outbound.lock();
        let Some(outbound) = outbound.as_ref() else {
            return Err(NetError::ConnectionBroken(self.id));
        };

        outbound.try_send(bytes).map_err(|err| match err {
            TrySendError::Full(_) => NetError::OutboundFull(self.id),
            TrySendError::Closed(_) => NetError::ConnectionBroken(self.id),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Teardown --------------------------------------------------

impl<P, U> Connection<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    /// I/O or framing failure, from either task. Only the first caller tears the
    /// connection down and reports `ConnectionError`.
    pub(crate) async fn fail(self: &Arc<Self>, cause: NetError) {
        if !self.mark_broken() {
            return;
        }

        debug!(conn = %self.id, peer = %self.remote_addr, "connection failed: {cause}");
        self.release();

        let _ = self
            .events
            .send(Event::ConnectionError(self.clone(), cause))
            .await;
    }

    /// Caller-initiated teardown. Reports `ConnectionClosed`; returns false if the
    /// connection was already broken.
    ///
    /// The event is queued without waiting, since the caller is usually the one
    /// draining the event queue. When the queue is full it is handed to a task on
    /// the current runtime; outside a runtime it is dropped.
    pub(crate) fn close(self: &Arc<Self>) -> bool {
        if !self.mark_broken() {
            return false;
        }

        debug!(conn = %self.id, peer = %self.remote_addr, "connection closed");
        self.release();

        match self.events.try_send(Event::ConnectionClosed(self.clone())) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => match Handle::try_current() {
                Ok(runtime) => {
                    let events = self.events.clone();
                    runtime.spawn(async move {
                        let _ = events.send(event).await;
                    });
                }
                Err(_) => {
                    warn!(conn = %self.id, "event queue full outside a runtime; close not reported");
                }
            },
        }

        true
    }
}

impl<P: WireProtocol, U> Connection<P, U> {
    /// Teardown without any event, for connections the caller never heard of.
    pub(crate) fn discard(&self) {
        if self.mark_broken() {
            self.release();
        }
    }

    fn mark_broken(&self) -> bool {
        self.status
            .compare_exchange(
                ConnStatus::Connected as u8,
                ConnStatus::Broken as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    // Close the outbound queue, stop both tasks (dropping the socket halves),
    // leave the owner set.
    fn release(&self) {
        self.outbound.lock().take();
        self.closed.send_replace(true);

        if let Some(owner) = self.owner.upgrade() {
            owner.remove(self.id);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Tasks -----------------------------------------------------

impl<P, U> Connection<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    async fn read_loop(self: Arc<Self>, mut inbox: Inbox, max_body_len: usize) {
        let mut closed = self.closed.subscribe();

        loop {
            let unit = select! {
                biased;
                _ = closed.wait_for(|c| *c) => return,
                unit = self.read_unit(&mut inbox, max_body_len) => unit,
            };

            let payload = match unit {
                Ok(payload) => payload,
                Err(err) => {
                    self.fail(err).await;
                    return;
                }
            };

            self.touch();

            // Blocks while the event queue is full; closing still gets through.
            let delivered = select! {
                biased;
                _ = closed.wait_for(|c| *c) => return,
                res = self.events.send(Event::NewData(self.clone(), payload)) => res.is_ok(),
            };

            if !delivered {
                trace!(conn = %self.id, "event queue closed; reader stopping");
                return;
            }
        }
    }

    async fn read_unit(
        &self,
        inbox: &mut Inbox,
        max_body_len: usize,
    ) -> Result<Payload<P::Message>, NetError> {
        let Some(protocol) = self.framing() else {
            return Ok(Payload::Raw(inbox.take(1).await?));
        };

        let header = inbox.take(protocol.header_len()).await?;
        let (decoded, body_len) = protocol.body_len(&header).map_err(NetError::protocol)?;

        if body_len > max_body_len {
            return Err(NetError::FrameTooLarge {
                len: body_len,
                max: max_body_len,
            });
        }

        let body = inbox.take(body_len).await?;
        let message = protocol.parse(decoded, body).map_err(NetError::protocol)?;

        Ok(Payload::Message(message))
    }

    async fn write_loop(self: Arc<Self>, mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Bytes>) {
        let mut closed = self.closed.subscribe();

        loop {
            let next = select! {
                biased;
                _ = closed.wait_for(|c| *c) => return,
                next = rx.recv() => next,
            };

            let Some(buf) = next else {
                return;
            };

            let written = select! {
                biased;
                _ = closed.wait_for(|c| *c) => return,
                res = write_burst(&mut writer, buf, &mut rx) => res,
            };

            if let Err(err) = written {
                self.fail(err.into()).await;
                return;
            }

            self.touch();
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Private ---------------------------------------------------

impl<P: WireProtocol, U> Connection<P, U> {
    /// The protocol, if it actually frames. A zero-length header means raw mode.
    fn framing(&self) -> Option<&P> {
        self.protocol.as_deref().filter(|p| p.header_len() > 0)
    }

    fn encode(&self, payload: Payload<P::Message>) -> Result<Bytes, NetError> {
        match (self.protocol.as_deref(), payload) {
            (None, Payload::Raw(bytes)) => Ok(bytes),
            (Some(protocol), Payload::Message(message)) => {
                protocol.serialize(&message).map_err(NetError::protocol)
            }
            (Some(protocol), Payload::Raw(bytes)) if protocol.header_len() == 0 => Ok(bytes),
            (None, Payload::Message(_)) => Err(NetError::PayloadMismatch {
                expected: "raw bytes",
            }),
            (Some(_), Payload::Raw(_)) => Err(NetError::PayloadMismatch {
                expected: "protocol message",
            }),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }
}

impl<P: WireProtocol, U> fmt::Debug for Connection<P, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("listener_id", &self.listener_id)
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- PendingConnection -----------------------------------------------------

impl<P, U> PendingConnection<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    pub(crate) fn connection(&self) -> &Arc<Connection<P, U>> {
        &self.conn
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        self.conn.info()
    }

    /// Split the socket and spawn the reader and writer tasks.
    pub(crate) fn start(self) {
        let (reader, writer) = self.stream.into_split();
        let inbox = Inbox::new(reader, self.read_capacity, self.conn.remote_addr);

        tokio::spawn(self.conn.clone().read_loop(inbox, self.max_body_len));
        tokio::spawn(self.conn.write_loop(writer, self.outbound_rx));
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn write_burst(
    writer: &mut OwnedWriteHalf,
    mut buf: Bytes,
    rx: &mut mpsc::Receiver<Bytes>,
) -> std::io::Result<()> {
    writer.write_all_buf(&mut buf).await?;

    // coalesce bursts to cut syscalls
    while let Ok(mut more) = rx.try_recv() {
        writer.write_all_buf(&mut more).await?;
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
