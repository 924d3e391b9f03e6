// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The per-connection task: owns the transport byte stream, frames it
//! into packets (C2+C3), and runs the keepalive monitor. Talks to the
//! dispatcher only through [`crate::commands`]. Grounded on
//! `hebo`'s listener/session split (`hebo/src/listener/session.rs`), merged
//! into one task since this design has no separate listener actor per
//! connection.

use std::time::Duration;

use mqtt_codec::{
    decode_packet, ConnectAckPacket, ConnectReturnCode, DecodeError, MAX_PACKET_LEN,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::commands::{ToConnection, ToDispatcher};
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;
use crate::types::{ConnId, DisconnectReason};

const INITIAL_READ_BUF: usize = 4096;
/// MQTT 3.1.1 has no keepalive until CONNECT sets one; this bounds how
/// long an opened-but-idle transport is tolerated before the first
/// packet arrives.
const PRE_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct Connection {
    conn_id: ConnId,
    stream: Stream,
    to_dispatcher: mpsc::Sender<ToDispatcher>,
    from_dispatcher: mpsc::Receiver<ToConnection>,
    /// `1.5 * keep_alive`, per spec §4.4; `None` until CONNECT is seen.
    keepalive_deadline: Option<Duration>,
    /// Whether a valid CONNECT has been decoded yet; a decode failure
    /// before this point gets a CONNACK error code instead of a bare
    /// close, per spec §4.1/§4.6.
    connect_seen: bool,
}

impl Connection {
    #[must_use]
    pub fn new(
        conn_id: ConnId,
        stream: Stream,
        to_dispatcher: mpsc::Sender<ToDispatcher>,
        from_dispatcher: mpsc::Receiver<ToConnection>,
    ) -> Self {
        Self {
            conn_id,
            stream,
            to_dispatcher,
            from_dispatcher,
            keepalive_deadline: None,
            connect_seen: false,
        }
    }

    pub async fn run(mut self) {
        let reason = self.pump().await;
        self.stream.close().await;
        let _ = self
            .to_dispatcher
            .send(ToDispatcher::Closed {
                conn_id: self.conn_id,
                reason,
            })
            .await;
    }

    async fn pump(&mut self) -> DisconnectReason {
        let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_READ_BUF);

        loop {
            let read_timeout = self.keepalive_deadline.unwrap_or(PRE_CONNECT_TIMEOUT);

            tokio::select! {
                result = timeout(read_timeout, self.stream.read_buf(&mut buf)) => {
                    match result {
                        Err(_elapsed) => return DisconnectReason::KeepaliveTimeout,
                        Ok(Err(_io_err)) => return DisconnectReason::ConnectionLost,
                        Ok(Ok(0)) => return DisconnectReason::ConnectionLost,
                        Ok(Ok(_n)) => {
                            if buf.len() > MAX_PACKET_LEN {
                                return DisconnectReason::ProtocolViolation;
                            }
                            match self.drain_packets(&mut buf).await {
                                Ok(()) => {}
                                Err(DrainError::BadConnect(code)) => {
                                    self.send_connack_refusal(code).await;
                                    return DisconnectReason::ProtocolViolation;
                                }
                                Err(DrainError::Other(_)) => return DisconnectReason::ProtocolViolation,
                            }
                        }
                    }
                }
                cmd = self.from_dispatcher.recv() => {
                    match cmd {
                        Some(ToConnection::Send(packet)) => {
                            let mut out = Vec::new();
                            if packet.encode(&mut out).is_ok() && self.stream.write(&out).await.is_err() {
                                return DisconnectReason::ConnectionLost;
                            }
                        }
                        Some(ToConnection::Close(reason)) => return reason,
                        None => return DisconnectReason::ServerShutdown,
                    }
                }
            }
        }
    }

    async fn drain_packets(&mut self, buf: &mut Vec<u8>) -> Result<(), DrainError> {
        loop {
            match decode_packet(buf) {
                Ok(Some((packet, consumed))) => {
                    if let mqtt_codec::Packet::Connect(ref connect) = packet {
                        self.connect_seen = true;
                        let keep_alive = connect.keep_alive();
                        if keep_alive > 0 {
                            self.keepalive_deadline =
                                Some(Duration::from_millis(u64::from(keep_alive) * 1500));
                        }
                    }
                    buf.drain(..consumed);
                    self.to_dispatcher
                        .send(ToDispatcher::Packet {
                            conn_id: self.conn_id,
                            packet,
                        })
                        .await
                        .map_err(|err| DrainError::Other(Error::from(err)))?;
                }
                Ok(None) => return Ok(()),
                Err(err) if !self.connect_seen => {
                    return Err(DrainError::BadConnect(connack_code_for(err)));
                }
                Err(err) => {
                    return Err(DrainError::Other(Error::new(ErrorKind::MalformedPacket, err.to_string())));
                }
            }
        }
    }

    /// Sends a CONNACK carrying `code` directly over the transport, bypassing
    /// the dispatcher: the dispatcher never learns of a connection whose
    /// CONNECT didn't decode, so there is no session to route this through.
    async fn send_connack_refusal(&mut self, code: ConnectReturnCode) {
        let ack = ConnectAckPacket::new(false, code);
        let mut out = Vec::new();
        if ack.encode(&mut out).is_ok() {
            let _ = self.stream.write(&out).await;
        }
    }
}

enum DrainError {
    /// The first packet on the wire failed to decode as a valid CONNECT;
    /// carries the CONNACK code it should be refused with.
    BadConnect(ConnectReturnCode),
    Other(Error),
}

/// Maps a CONNECT decode failure to the CONNACK return code spec §4.1
/// mandates for it.
fn connack_code_for(err: DecodeError) -> ConnectReturnCode {
    match err {
        DecodeError::InvalidProtocolName | DecodeError::InvalidProtocolLevel => {
            ConnectReturnCode::UnacceptableProtocolVersion
        }
        DecodeError::InvalidClientId => ConnectReturnCode::IdentifierRejected,
        _ => ConnectReturnCode::ServerUnavailable,
    }
}
