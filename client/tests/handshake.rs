// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handshake-level tests against a minimal hand-rolled TCP listener,
//! independent of the broker crate: these exercise `Client::connect`'s
//! CONNACK handling without needing a real dispatcher.

use std::time::Duration;

use mqtt_codec::{decode_packet, ConnectAckPacket, ConnectReturnCode, Packet};
use mqtt_client::{Client, ConnectOptions, Event};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_one_packet(socket: &mut TcpStream) -> Packet {
    let mut buf = Vec::new();
    loop {
        let mut chunk = [0u8; 256];
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "peer closed before sending a full packet");
        buf.extend_from_slice(&chunk[..n]);
        if let Some((packet, _consumed)) = decode_packet(&buf).unwrap() {
            return packet;
        }
    }
}

async fn send_connack(socket: &mut TcpStream, session_present: bool, code: ConnectReturnCode) {
    let ack = ConnectAckPacket::new(session_present, code);
    let mut out = Vec::new();
    ack.encode(&mut out).unwrap();
    socket.write_all(&out).await.unwrap();
}

#[tokio::test]
async fn accepted_connack_resolves_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let packet = read_one_packet(&mut socket).await;
        assert!(matches!(packet, Packet::Connect(_)));
        send_connack(&mut socket, false, ConnectReturnCode::Accepted).await;
        // Keep the socket open so the client's keepalive doesn't trip
        // mid-test.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let options = ConnectOptions::new(addr.to_string()).with_client_id("handshake-ok");
    let (_client, mut events) = Client::connect(options).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), Event::Connected { session_present: false });

    server.abort();
}

#[tokio::test]
async fn refused_connack_surfaces_as_connection_refused_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _packet = read_one_packet(&mut socket).await;
        send_connack(&mut socket, false, ConnectReturnCode::NotAuthorized).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let options = ConnectOptions::new(addr.to_string())
        .with_client_id("handshake-refused")
        .with_reconnect_policy(mqtt_client::ReconnectPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
            max_attempts: Some(0),
        });
    let err = Client::connect(options).await.unwrap_err();
    assert_eq!(err.kind(), mqtt_client::ErrorKind::ConnectionRefused(ConnectReturnCode::NotAuthorized));

    server.abort();
}
