// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The orchestrator (C6): binds every configured listener, accepts
//! connections, and wires each one to the dispatcher. Grounded on
//! `hebo/src/listener/init.rs`'s per-listener bind/accept/wrap sequence,
//! modernized onto `tokio-rustls` 0.26's builder API (the teacher predates
//! it) and trimmed to the four transports spec.md names.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as TlsServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server as ws_server;

use crate::commands::{ToConnection, ToDispatcher};
use crate::config::{Config, Listener as ListenerConfig};
use crate::connection::Connection;
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;
use crate::types::ListenerId;

const CHANNEL_CAPACITY: usize = 256;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

fn load_tls_acceptor(listener: &ListenerConfig) -> Result<TlsAcceptor, Error> {
    let cert_path = listener
        .cert_file()
        .ok_or_else(|| Error::new(ErrorKind::ConfigError, "cert_file is required for a TLS listener"))?;
    let key_path = listener
        .key_file()
        .ok_or_else(|| Error::new(ErrorKind::ConfigError, "key_file is required for a TLS listener"))?;

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()
        .map_err(|err| Error::new(ErrorKind::ConfigError, format!("invalid cert file: {err}")))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))
        .map_err(|err| Error::new(ErrorKind::ConfigError, format!("invalid key file: {err}")))?
        .ok_or_else(|| Error::new(ErrorKind::ConfigError, "no private key found in key file"))?;

    let tls_config = TlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::new(ErrorKind::ConfigError, format!("invalid TLS config: {err}")))?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Binds every listener in `config` and runs until `shutdown` fires, then
/// stops accepting and waits up to `shutdown_grace_period` seconds for
/// in-flight connections to finish before returning.
pub async fn run(config: Config, dispatcher_sender: mpsc::Sender<ToDispatcher>, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
    let mut accept_tasks = JoinSet::new();

    for (idx, listener_config) in config.listeners().iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let listener_id: ListenerId = idx as ListenerId;
        let tcp = TcpListener::bind(listener_config.address()).await?;
        let tls_acceptor = if listener_config.is_tls() {
            Some(load_tls_acceptor(listener_config)?)
        } else {
            None
        };

        let dispatcher_sender = dispatcher_sender.clone();
        let max_connections = listener_config.max_connections();
        let keep_alive = listener_config.keep_alive();
        let mut shutdown = shutdown.clone();
        let is_websocket = listener_config.is_websocket();

        accept_tasks.spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = tcp.accept() => {
                        let Ok((socket, peer_addr)) = accepted else { continue; };
                        if max_connections != 0 && connections.len() >= max_connections {
                            drop(socket);
                            continue;
                        }

                        let tls_acceptor = tls_acceptor.clone();
                        let dispatcher_sender = dispatcher_sender.clone();
                        connections.spawn(async move {
                            let stream = match build_stream(socket, tls_acceptor, is_websocket).await {
                                Ok(s) => s,
                                Err(_) => return,
                            };
                            let conn_id = next_conn_id();
                            let (to_conn_tx, to_conn_rx) = mpsc::channel(CHANNEL_CAPACITY);

                            if dispatcher_sender
                                .send(ToDispatcher::NewConnection {
                                    conn_id,
                                    listener_id,
                                    listener_keep_alive: keep_alive,
                                    peer_addr: Some(peer_addr),
                                    sender: to_conn_tx,
                                })
                                .await
                                .is_err()
                            {
                                return;
                            }

                            let connection = Connection::new(conn_id, stream, dispatcher_sender, to_conn_rx);
                            connection.run().await;
                        });
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            connections
        });
    }

    // Wait for shutdown, then give every listener's in-flight connections
    // `shutdown_grace_period` seconds to drain before returning.
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            break;
        }
    }

    let grace = std::time::Duration::from_secs(config.general().shutdown_grace_period());
    let drain = async {
        while let Some(result) = accept_tasks.join_next().await {
            if let Ok(mut connections) = result {
                while connections.join_next().await.is_some() {}
            }
        }
    };
    let _ = tokio::time::timeout(grace, drain).await;

    Ok(())
}

/// The only WebSocket subprotocol this broker speaks, per spec §6.
const WS_SUBPROTOCOL: &str = "mqtt";

/// Rejects a WebSocket upgrade that doesn't offer the `mqtt` subprotocol,
/// and echoes it back on the ones that do, per RFC 6455 §1.9.
fn check_ws_subprotocol(
    request: &ws_server::Request,
    mut response: ws_server::Response,
) -> Result<ws_server::Response, ws_server::ErrorResponse> {
    let offers_mqtt = request
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|p| p.trim().eq_ignore_ascii_case(WS_SUBPROTOCOL)));

    if !offers_mqtt {
        let resp = http::Response::builder()
            .status(http::StatusCode::BAD_REQUEST)
            .body(Some("missing Sec-WebSocket-Protocol: mqtt".to_string()))
            .expect("static response is well-formed");
        return Err(resp);
    }

    response.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        http::HeaderValue::from_static(WS_SUBPROTOCOL),
    );
    Ok(response)
}

async fn build_stream(
    socket: tokio::net::TcpStream,
    tls_acceptor: Option<TlsAcceptor>,
    is_websocket: bool,
) -> Result<Stream, Error> {
    match (tls_acceptor, is_websocket) {
        (None, false) => Ok(Stream::Mqtt(socket)),
        (None, true) => {
            let ws = tokio_tungstenite::accept_hdr_async(socket, check_ws_subprotocol).await?;
            Ok(Stream::Ws(Box::new(ws)))
        }
        (Some(acceptor), false) => {
            let tls = acceptor.accept(socket).await?;
            Ok(Stream::Mqtts(Box::new(tls)))
        }
        (Some(acceptor), true) => {
            let tls = acceptor.accept(socket).await?;
            let ws = tokio_tungstenite::accept_hdr_async(tls, check_ws_subprotocol).await?;
            Ok(Stream::Wss(Box::new(ws)))
        }
    }
}
