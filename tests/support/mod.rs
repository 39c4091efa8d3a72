use bytes::{BufMut, Bytes, BytesMut};
use std::{
    net::TcpListener,
    path::Path,
    process::{Child, Command},
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{net::TcpStream, time::sleep};

use simplenet::{ConnectionInfo, Event, Listener, SimpleNet, WireProtocol};

const EVENT_DEADLINE: Duration = Duration::from_secs(5);
const POLL_STEP: Duration = Duration::from_millis(100);

// -----------------------------------------------------------------------------
// ----- Events ----------------------------------------------------------------

/// Poll until something other than `Timeout` shows up.
#[allow(dead_code)]
pub async fn next_event<P, U>(net: &SimpleNet<P, U>) -> Event<P, U>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    let deadline = Instant::now() + EVENT_DEADLINE;
    loop {
        let event = net.poll_event(POLL_STEP).await.expect("poll_event");
        if !event.is_timeout() {
            return event;
        }
        assert!(Instant::now() < deadline, "no event within {EVENT_DEADLINE:?}");
    }
}

/// Collect every non-timeout event that arrives within `window`.
#[allow(dead_code)]
pub async fn drain_events<P, U>(net: &SimpleNet<P, U>, window: Duration) -> Vec<Event<P, U>>
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    let until = Instant::now() + window;
    let mut events = Vec::new();

    while let Some(left) = until.checked_duration_since(Instant::now()) {
        let event = net.poll_event(left).await.expect("poll_event");
        if event.is_timeout() {
            break;
        }
        events.push(event);
    }

    events
}

// -----------------------------------------------------------------------------
// ----- Sockets ---------------------------------------------------------------

#[allow(dead_code)]
pub async fn listen_local<P, U>(
    net: &SimpleNet<P, U>,
    protocol: Option<Arc<P>>,
) -> (Arc<Listener<P, U>>, String)
where
    P: WireProtocol,
    U: Send + Sync + 'static,
{
    let listener = net.listen("127.0.0.1:0", protocol).await.expect("listen");
    let addr = listener.local_address().to_string();
    (listener, addr)
}

#[allow(dead_code)]
pub async fn raw_peer(addr: &str) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect raw peer")
}

#[allow(dead_code)]
pub fn reserve_port(host: &str) -> u16 {
    let addr = format!("{host}:0");
    let listener = TcpListener::bind(&addr).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

// -----------------------------------------------------------------------------
// ----- Server binary ---------------------------------------------------------

/// Kills the server when the test ends, pass or fail.
#[allow(dead_code)]
pub struct ServerProcess(Child);

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[allow(dead_code)]
pub fn spawn_simplenet(host: &str, port: u16, framing: &str) -> ServerProcess {
    let mut cmd = simplenet_command(host, port, framing);
    cmd.env_remove("SIMPLENET_CONFIG_FILE");
    ServerProcess(cmd.spawn().expect("spawn simplenet"))
}

/// Same as `spawn_simplenet`, reading a TOML config file as well.
#[allow(dead_code)]
pub fn spawn_simplenet_with_config(
    host: &str,
    port: u16,
    framing: &str,
    config: &Path,
) -> ServerProcess {
    let mut cmd = simplenet_command(host, port, framing);
    cmd.env("SIMPLENET_CONFIG_FILE", config);
    ServerProcess(cmd.spawn().expect("spawn simplenet"))
}

fn simplenet_command(host: &str, port: u16, framing: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_simplenet"));
    cmd.env("SIMPLENET_HOST", host)
        .env("SIMPLENET_PORT", port.to_string())
        .env("SIMPLENET_FRAMING", framing)
        .env("SIMPLENET_LOG", "warn");
    cmd
}

#[allow(dead_code)]
pub async fn wait_for_listen(host: &str, port: u16) {
    let addr = format!("{host}:{port}");
    for _ in 0..50 {
        if std::net::TcpStream::connect(&addr).is_ok() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("simplenet did not start listening on {addr}");
}

// -----------------------------------------------------------------------------
// ----- TinyFrames ------------------------------------------------------------

/// One-byte length header followed by up to 255 body bytes. The accept filter
/// can be switched off to reject every connection.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub struct TinyFrames {
    pub accept: bool,
}

#[allow(dead_code)]
impl TinyFrames {
    pub fn accepting() -> Arc<Self> {
        Arc::new(TinyFrames { accept: true })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(TinyFrames { accept: false })
    }

    pub fn frame(body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(body.len() + 1);
        buf.put_u8(body.len() as u8);
        buf.put_slice(body);
        buf.freeze()
    }
}

#[derive(Debug, Error)]
pub enum TinyFrameError {
    #[error("body of {0} bytes does not fit a one-byte header")]
    TooLong(usize),
}

impl WireProtocol for TinyFrames {
    type Header = ();
    type Message = Bytes;
    type Error = TinyFrameError;

    fn header_len(&self) -> usize {
        1
    }

    fn body_len(&self, header: &[u8]) -> Result<((), usize), TinyFrameError> {
        Ok(((), header[0] as usize))
    }

    fn parse(&self, _header: (), body: Bytes) -> Result<Bytes, TinyFrameError> {
        Ok(body)
    }

    fn serialize(&self, message: &Bytes) -> Result<Bytes, TinyFrameError> {
        if message.len() > u8::MAX as usize {
            return Err(TinyFrameError::TooLong(message.len()));
        }
        Ok(Self::frame(message))
    }

    fn accept_filter(&self, _conn: &ConnectionInfo) -> bool {
        self.accept
    }
}
