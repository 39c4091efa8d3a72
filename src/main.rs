use std::{fmt, sync::Arc};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

use simplenet::{
    CommandMessage, CommandProtocol, Config, Event, NetError, Payload, Raw, SimpleNet,
    WireProtocol,
    config::FramingMode,
    wire_protocol::command::{CMD_BIZ_REQ, CMD_BIZ_RSP, CMD_HEARTBEAT_REQ, CMD_HEARTBEAT_RSP},
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "simplenet";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), NetError> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter =
        EnvFilter::try_new(config.log_level.as_str()).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = subscriber_fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> Result<(), NetError> {
    let config = Config::snapshot();

    match config.framing {
        FramingMode::Raw => serve::<Raw, _>(&config, None, Some).await,
        FramingMode::Command => {
            let protocol = Arc::new(CommandProtocol::new());
            let replies = protocol.clone();
            serve(&config, Some(protocol), move |payload| {
                answer(&replies, payload)
            })
            .await
        }
    }
}

/// Poll loop shared by both framings. Each connection's user data counts the
/// units it delivered.
async fn serve<P, F>(config: &Config, protocol: Option<Arc<P>>, reply: F) -> Result<(), NetError>
where
    P: WireProtocol,
    P::Message: fmt::Debug,
    F: Fn(Payload<P::Message>) -> Option<Payload<P::Message>>,
{
    let net: SimpleNet<P, u64> = SimpleNet::new(config.net.clone());
    let listener = net
        .listen(&config.listen_addr.to_string(), protocol)
        .await?;

    info!(
        "{} listening on {} ({} framing)",
        APP_NAME,
        listener.local_address(),
        config.framing.as_str()
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("{} shutting down", APP_NAME);
                break;
            }

            event = net.poll_event(config.poll_timeout) => {
                match event? {
                    Event::NewConnection(conn) => {
                        conn.user_data().set(0);
                        info!(conn = %conn.id(), peer = %conn.remote_address(), "new connection");
                    }

                    Event::NewData(conn, payload) => {
                        conn.user_data().with_mut(|n| {
                            if let Some(n) = n {
                                *n += 1;
                            }
                        });
                        debug!(conn = %conn.id(), "received {payload:?}");

                        // a peer that stops reading must not stall the loop
                        let Some(out) = reply(payload) else { continue };
                        match net.try_send_data(&conn, out) {
                            Ok(()) => {}
                            Err(NetError::OutboundFull(id)) => {
                                warn!(conn = %id, "peer is not reading replies; closing");
                                let _ = net.close_conn(&conn);
                            }
                            Err(e) => warn!(conn = %conn.id(), "reply failed: {e}"),
                        }
                    }

                    Event::ConnectionError(conn, cause) => {
                        let units = conn.user_data().get().unwrap_or_default();
                        if cause.is_peer_fault() {
                            info!(conn = %conn.id(), units, "connection ended: {cause}");
                        } else {
                            warn!(conn = %conn.id(), units, "connection error: {cause}");
                        }
                    }

                    Event::ConnectionClosed(conn) => {
                        info!(conn = %conn.id(), "connection closed");
                    }

                    Event::Timeout => {
                        for conn in listener.connections() {
                            let idle = conn.idle_for();
                            if idle >= config.idle_after {
                                info!(
                                    conn = %conn.id(),
                                    idle = %humantime::format_duration(idle),
                                    "connection idle"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    net.destroy().await;
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Command replies -------------------------------------------------------

fn answer(
    protocol: &CommandProtocol,
    payload: Payload<CommandMessage>,
) -> Option<Payload<CommandMessage>> {
    let msg = payload.into_message()?;
    info!("{}", protocol.describe(&msg));

    let reply = match msg.command {
        CMD_HEARTBEAT_REQ => CMD_HEARTBEAT_RSP,
        CMD_BIZ_REQ => CMD_BIZ_RSP,
        _ => return None,
    };

    Some(Payload::Message(
        CommandMessage::new(reply, msg.body).with_extra(msg.extra),
    ))
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
