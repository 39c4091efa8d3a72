mod support;

use bytes::{BufMut, Bytes, BytesMut};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use simplenet::{
    CommandMessage, CommandProtocol, ConnStatus, Event, NetConfig, NetError, Payload, SimpleNet,
    WireProtocol,
    wire_protocol::command::{CMD_BIZ_REQ, CMD_BIZ_RSP, CMD_HEARTBEAT_REQ, CMD_HEARTBEAT_RSP},
};

use support::TinyFrames;

fn command_net() -> (SimpleNet<CommandProtocol>, Arc<CommandProtocol>) {
    (SimpleNet::default(), Arc::new(CommandProtocol::new()))
}

#[tokio::test]
async fn heartbeat_exchange_between_listen_and_connect() {
    let (net, proto) = command_net();
    let (listener, addr) = support::listen_local(&net, Some(proto.clone())).await;

    let client = net.connect(&addr, Some(proto.clone())).await.unwrap();
    let Event::NewConnection(server) = support::next_event(&net).await else {
        panic!("expected NewConnection");
    };
    assert_eq!(server.listener_id(), Some(listener.id()));
    assert_eq!(server.remote_address(), client.local_address());

    let ping = CommandMessage::new(CMD_HEARTBEAT_REQ, &b"sid-1"[..]).with_extra(9);
    net.send_data(&client, Payload::Message(ping.clone()))
        .await
        .unwrap();

    let Event::NewData(from, payload) = support::next_event(&net).await else {
        panic!("expected NewData on the server side");
    };
    assert_eq!(from.id(), server.id());
    assert_eq!(payload.into_message(), Some(ping.clone()));

    let pong = CommandMessage::new(CMD_HEARTBEAT_RSP, ping.body.clone()).with_extra(ping.extra);
    net.send_data(&server, Payload::Message(pong.clone()))
        .await
        .unwrap();

    let Event::NewData(from, payload) = support::next_event(&net).await else {
        panic!("expected NewData on the client side");
    };
    assert_eq!(from.id(), client.id());
    assert_eq!(payload.into_message(), Some(pong));

    net.destroy().await;
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let (net, proto) = command_net();
    let (_listener, addr) = support::listen_local(&net, Some(proto.clone())).await;

    let client = net.connect(&addr, Some(proto)).await.unwrap();
    assert!(matches!(
        support::next_event(&net).await,
        Event::NewConnection(_)
    ));

    for seq in 1..=3u64 {
        let msg = CommandMessage::new(CMD_BIZ_REQ, format!("M{seq}")).with_extra(seq);
        net.send_data(&client, Payload::Message(msg)).await.unwrap();
    }

    for seq in 1..=3u64 {
        let Event::NewData(_, payload) = support::next_event(&net).await else {
            panic!("expected NewData");
        };
        let msg = payload.into_message().unwrap();
        assert_eq!(msg.extra, seq);
        assert_eq!(msg.body, Bytes::from(format!("M{seq}")));
    }

    net.destroy().await;
}

#[tokio::test]
async fn concurrent_connections_all_deliver() {
    const PEERS: usize = 8;

    let (net, proto) = command_net();
    let (listener, addr) = support::listen_local(&net, Some(proto.clone())).await;

    let mut writers = Vec::new();
    for i in 0..PEERS {
        let addr = addr.clone();
        let proto = proto.clone();
        writers.push(tokio::spawn(async move {
            let mut peer = support::raw_peer(&addr).await;
            let msg = CommandMessage::new(CMD_BIZ_REQ, format!("peer-{i}"));
            peer.write_all(&proto.serialize(&msg).unwrap()).await.unwrap();
            peer
        }));
    }

    let mut peers = Vec::new();
    for w in writers {
        peers.push(w.await.unwrap());
    }

    let mut seen = HashSet::new();
    let mut accepted = HashSet::new();
    while seen.len() < PEERS {
        match support::next_event(&net).await {
            Event::NewConnection(conn) => {
                accepted.insert(conn.id());
            }
            Event::NewData(conn, payload) => {
                assert!(accepted.contains(&conn.id()), "data before NewConnection");
                let body = payload.into_message().unwrap().body;
                seen.insert(String::from_utf8(body.to_vec()).unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    let expected: HashSet<_> = (0..PEERS).map(|i| format!("peer-{i}")).collect();
    assert_eq!(seen, expected);
    assert_eq!(listener.connection_count(), PEERS);

    drop(peers);
    net.destroy().await;
}

#[tokio::test]
async fn biz_reply_reaches_a_plain_socket() {
    let (net, proto) = command_net();
    let (_listener, addr) = support::listen_local(&net, Some(proto.clone())).await;

    let mut peer = support::raw_peer(&addr).await;
    let request = CommandMessage::new(CMD_BIZ_REQ, &b"payload"[..]).with_extra(3);
    peer.write_all(&proto.serialize(&request).unwrap())
        .await
        .unwrap();

    let mut server = None;
    while server.is_none() {
        if let Event::NewData(conn, payload) = support::next_event(&net).await {
            assert_eq!(payload.into_message(), Some(request.clone()));
            server = Some(conn);
        }
    }
    let server = server.unwrap();

    let reply = CommandMessage::new(CMD_BIZ_RSP, request.body.clone()).with_extra(3);
    net.send_data(&server, Payload::Message(reply)).await.unwrap();

    let mut header = [0u8; 20];
    peer.read_exact(&mut header).await.unwrap();
    let (decoded, len) = proto.body_len(&header).unwrap();
    assert_eq!(decoded.command, CMD_BIZ_RSP);
    assert_eq!(decoded.extra, 3);

    let mut body = vec![0u8; len];
    peer.read_exact(&mut body).await.unwrap();
    assert_eq!(body, b"payload");

    net.destroy().await;
}

#[tokio::test]
async fn rejected_socket_produces_no_event() {
    let net: SimpleNet<TinyFrames> = SimpleNet::default();
    let (listener, addr) = support::listen_local(&net, Some(TinyFrames::rejecting())).await;

    let mut peer = support::raw_peer(&addr).await;

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
        .await
        .expect("rejected socket should be closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    let events = support::drain_events(&net, Duration::from_millis(200)).await;
    assert!(events.is_empty(), "unexpected events: {events:?}");
    assert_eq!(listener.connection_count(), 0);

    net.destroy().await;
}

#[tokio::test]
async fn accepted_by_filter_frames_small_messages() {
    let net: SimpleNet<TinyFrames> = SimpleNet::default();
    let (_listener, addr) = support::listen_local(&net, Some(TinyFrames::accepting())).await;

    let mut peer = support::raw_peer(&addr).await;
    peer.write_all(&TinyFrames::frame(b"ab")).await.unwrap();
    peer.write_all(&TinyFrames::frame(b"")).await.unwrap();

    assert!(matches!(
        support::next_event(&net).await,
        Event::NewConnection(_)
    ));

    for expected in [&b"ab"[..], &b""[..]] {
        let Event::NewData(_, payload) = support::next_event(&net).await else {
            panic!("expected NewData");
        };
        assert_eq!(payload.into_message().as_deref(), Some(expected));
    }

    net.destroy().await;
}

#[tokio::test]
async fn unknown_command_breaks_the_connection() {
    let (net, proto) = command_net();
    let (listener, addr) = support::listen_local(&net, Some(proto)).await;

    let mut peer = support::raw_peer(&addr).await;
    let mut frame = BytesMut::new();
    frame.put_u64(0xdead);
    frame.put_u32(0);
    frame.put_u64(0);
    peer.write_all(&frame).await.unwrap();

    let Event::NewConnection(accepted) = support::next_event(&net).await else {
        panic!("expected NewConnection");
    };

    match support::next_event(&net).await {
        Event::ConnectionError(conn, NetError::Protocol(cause)) => {
            assert_eq!(conn.id(), accepted.id());
            assert!(cause.to_string().contains("0xdead"));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }

    assert_eq!(accepted.status(), ConnStatus::Broken);
    assert_eq!(listener.connection_count(), 0);

    net.destroy().await;
}

#[tokio::test]
async fn oversized_frame_breaks_the_connection() {
    let config = NetConfig {
        max_body_len: 16,
        ..NetConfig::default()
    };
    let net: SimpleNet<CommandProtocol> = SimpleNet::new(config);
    let (_listener, addr) = support::listen_local(&net, Some(Arc::new(CommandProtocol::new()))).await;

    let mut peer = support::raw_peer(&addr).await;
    let mut frame = BytesMut::new();
    frame.put_u64(CMD_BIZ_REQ);
    frame.put_u32(1000);
    frame.put_u64(0);
    peer.write_all(&frame).await.unwrap();

    assert!(matches!(
        support::next_event(&net).await,
        Event::NewConnection(_)
    ));

    let event = support::next_event(&net).await;
    assert!(
        matches!(
            event,
            Event::ConnectionError(_, NetError::FrameTooLarge { len: 1000, max: 16 })
        ),
        "got {event:?}"
    );

    net.destroy().await;
}

#[tokio::test]
async fn raw_payload_is_refused_on_a_framed_connection() {
    let (net, proto) = command_net();
    let (_listener, addr) = support::listen_local(&net, Some(proto.clone())).await;
    let client = net.connect(&addr, Some(proto)).await.unwrap();

    let err = net
        .send_data(&client, Payload::raw(&b"nope"[..]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetError::PayloadMismatch {
            expected: "protocol message"
        }
    ));

    let err = net
        .send_data(&client, Payload::Message(CommandMessage::new(0x42, Bytes::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Protocol(_)));
    assert!(client.is_connected());

    net.destroy().await;
}

#[tokio::test]
async fn user_data_travels_with_the_connection() {
    let net: SimpleNet<CommandProtocol, String> = SimpleNet::default();
    let proto = Arc::new(CommandProtocol::new());
    let (listener, addr) = support::listen_local(&net, Some(proto.clone())).await;
    listener.user_data().set("front door".to_string());

    let client = net.connect(&addr, Some(proto)).await.unwrap();
    let Event::NewConnection(server) = support::next_event(&net).await else {
        panic!("expected NewConnection");
    };
    server.user_data().set("session-7".to_string());

    net.send_data(
        &client,
        Payload::Message(CommandMessage::new(CMD_HEARTBEAT_REQ, Bytes::new())),
    )
    .await
    .unwrap();

    let Event::NewData(conn, _) = support::next_event(&net).await else {
        panic!("expected NewData");
    };
    assert_eq!(conn.user_data().get().as_deref(), Some("session-7"));
    assert_eq!(listener.user_data().get().as_deref(), Some("front door"));
    assert!(!client.user_data().is_set());

    net.destroy().await;
}
