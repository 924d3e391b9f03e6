// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The client's connection task, grounded on `ruo::async_client::AsyncClient`'s
//! read-loop-plus-keepalive-timer shape but restructured as a
//! command/event actor: a public [`Client`] handle never touches the
//! transport, matching the broker crate's dispatcher/connection split.

use std::time::Duration;

use mqtt_codec::{
    decode_packet, ConnectPacket, ConnectReturnCode, DisconnectPacket, Packet, PingRequestPacket,
    PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, QoS, SubscribeAck, SubscribePacket, SubscribeTopic, UnsubscribePacket,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::commands::Command;
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::event::Event;
use crate::session::Session;
use crate::stream::Stream;

const INITIAL_READ_BUF: usize = 4096;
const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A connected MQTT client. Cloning shares the same underlying connection
/// task; drop every clone to let the task disconnect and exit.
#[derive(Clone)]
pub struct Client {
    command_tx: mpsc::Sender<Command>,
}

enum StopReason {
    UserDisconnected,
    ConnectionLost,
}

impl Client {
    /// Connects to `options.address()` and blocks until the broker accepts
    /// or refuses the CONNECT. On success, a background task keeps the
    /// connection alive (PINGREQ on `keep_alive`, auto-reconnect with
    /// backoff per `options.reconnect_policy()`) for the client's lifetime.
    ///
    /// # Errors
    /// Returns an error if the initial TCP/TLS connect fails, the CONNECT
    /// handshake times out, or the broker refuses the connection.
    pub async fn connect(options: ConnectOptions) -> Result<(Self, mpsc::Receiver<Event>), Error> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(run_actor(options, command_rx, event_tx, ready_tx));

        ready_rx
            .await
            .map_err(|_| Error::new(ErrorKind::ChannelError, "client task exited before connecting"))??;

        Ok((Self { command_tx }, event_rx))
    }

    /// # Errors
    /// Returns an error if the connection is down, the topic is malformed,
    /// or the broker rejects the request.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Publish {
                topic: topic.into(),
                payload: payload.into(),
                qos,
                retain,
                ack: ack_tx,
            })
            .await?;
        ack_rx
            .await
            .map_err(|_| Error::new(ErrorKind::ChannelError, "client task ended"))?
    }

    /// # Errors
    /// Returns an error if the connection is down or a filter is malformed.
    pub async fn subscribe(&self, filters: Vec<(String, QoS)>) -> Result<Vec<SubscribeAck>, Error> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Subscribe { filters, ack: ack_tx })
            .await?;
        ack_rx
            .await
            .map_err(|_| Error::new(ErrorKind::ChannelError, "client task ended"))?
    }

    /// # Errors
    /// Returns an error if the connection is down.
    pub async fn unsubscribe(&self, filters: Vec<String>) -> Result<(), Error> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Unsubscribe { filters, ack: ack_tx })
            .await?;
        ack_rx
            .await
            .map_err(|_| Error::new(ErrorKind::ChannelError, "client task ended"))?
    }

    /// Sends DISCONNECT and stops the background task; no reconnect
    /// follows, matching MQTT 3.1.1's "DISCONNECT means no will is fired"
    /// rule.
    ///
    /// # Errors
    /// Returns an error if the command channel is already closed.
    pub async fn disconnect(&self) -> Result<(), Error> {
        Ok(self.command_tx.send(Command::Disconnect).await?)
    }
}

async fn run_actor(
    options: ConnectOptions,
    mut command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<Event>,
    ready_tx: oneshot::Sender<Result<(), Error>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut session = Session::new();
    let mut attempt: u32 = 0;

    loop {
        match do_connect(&options).await {
            Ok((stream, session_present, leftover)) => {
                attempt = 0;
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
                let _ = event_tx.send(Event::Connected { session_present }).await;

                let reason = run_connected(&options, stream, leftover, &mut session, &mut command_rx, &event_tx).await;
                session.fail_all(&Error::new(ErrorKind::ConnectionLost, "connection closed"));
                let _ = event_tx.send(Event::Disconnected).await;
                if matches!(reason, StopReason::UserDisconnected) {
                    return;
                }
            }
            Err(err) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(err));
                }
            }
        }

        let policy = options.reconnect_policy();
        if let Some(max) = policy.max_attempts {
            if attempt >= max {
                let _ = event_tx.send(Event::ReconnectFailed).await;
                return;
            }
        }
        let backoff = policy.backoff_for(attempt);
        attempt += 1;
        let _ = event_tx.send(Event::Reconnecting { attempt }).await;

        tokio::select! {
            () = tokio::time::sleep(backoff) => {}
            cmd = command_rx.recv() => {
                match cmd {
                    None | Some(Command::Disconnect) => return,
                    Some(command) => fail_command(command, &Error::new(ErrorKind::ConnectionLost, "not connected")),
                }
            }
        }
    }
}

fn fail_command(command: Command, err: &Error) {
    match command {
        Command::Publish { ack, .. } => {
            let _ = ack.send(Err(err.clone()));
        }
        Command::Subscribe { ack, .. } => {
            let _ = ack.send(Err(err.clone()));
        }
        Command::Unsubscribe { ack, .. } => {
            let _ = ack.send(Err(err.clone()));
        }
        Command::Disconnect => {}
    }
}

/// Dials the transport, sends CONNECT, and waits up to
/// `options.connect_timeout()` for CONNACK. Returns the stream, whether
/// the broker reports a resumed session, and any bytes read past the
/// CONNACK that belong to the next packet.
async fn do_connect(options: &ConnectOptions) -> Result<(Stream, bool, Vec<u8>), Error> {
    let mut stream = Stream::connect(options.address(), options.connect_type()).await?;

    let mut connect = ConnectPacket::new(options.client_id(), options.clean_session(), keep_alive_secs(options))
        .map_err(|err| Error::new(ErrorKind::MalformedPacket, format!("{err:?}")))?;
    if let Some(will) = options.will() {
        connect = connect.with_will(&will.topic, &will.payload, will.qos, will.retain);
    }
    if let Some(username) = options.username() {
        connect = connect.with_credentials(username, options.password());
    }

    let mut buf = Vec::new();
    connect.encode(&mut buf)?;
    stream.write_all(&buf).await?;

    let mut read_buf: Vec<u8> = Vec::with_capacity(INITIAL_READ_BUF);
    let deadline = options.connect_timeout();
    loop {
        match decode_packet(&read_buf)? {
            Some((Packet::ConnectAck(ack), consumed)) => {
                read_buf.drain(..consumed);
                return match ack.return_code() {
                    ConnectReturnCode::Accepted => Ok((stream, ack.session_present(), read_buf)),
                    code => Err(Error::new(ErrorKind::ConnectionRefused(code), "CONNECT refused")),
                };
            }
            Some((_, _)) => return Err(Error::new(ErrorKind::ProtocolViolation, "expected CONNACK first")),
            None => {
                let n = timeout(deadline, stream.read_buf(&mut read_buf))
                    .await
                    .map_err(|_| Error::new(ErrorKind::Timeout, "timed out waiting for CONNACK"))??;
                if n == 0 {
                    return Err(Error::new(ErrorKind::ConnectionLost, "EOF before CONNACK"));
                }
            }
        }
    }
}

fn keep_alive_secs(options: &ConnectOptions) -> u16 {
    u16::try_from(options.keep_alive().as_secs()).unwrap_or(u16::MAX)
}

#[allow(clippy::too_many_lines)]
async fn run_connected(
    options: &ConnectOptions,
    mut stream: Stream,
    mut buf: Vec<u8>,
    session: &mut Session,
    command_rx: &mut mpsc::Receiver<Command>,
    event_tx: &mpsc::Sender<Event>,
) -> StopReason {
    let keep_alive = options.keep_alive();
    let read_timeout = if keep_alive.is_zero() {
        Duration::from_secs(3600)
    } else {
        keep_alive * 2
    };

    let mut ping_timer = if keep_alive.is_zero() {
        None
    } else {
        Some(tokio::time::interval(keep_alive))
    };
    if let Some(timer) = ping_timer.as_mut() {
        timer.tick().await; // first tick fires immediately; consume it
    }

    loop {
        let ping_tick = async {
            match ping_timer.as_mut() {
                Some(timer) => {
                    timer.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = timeout(read_timeout, stream.read_buf(&mut buf)) => {
                match result {
                    Err(_elapsed) => return StopReason::ConnectionLost,
                    Ok(Err(_io_err)) => return StopReason::ConnectionLost,
                    Ok(Ok(0)) => return StopReason::ConnectionLost,
                    Ok(Ok(_n)) => {
                        if let Err(_stop) = drain_packets(&mut buf, session, &mut stream, event_tx).await {
                            return StopReason::ConnectionLost;
                        }
                    }
                }
            }
            () = ping_tick => {
                let mut out = Vec::new();
                if PingRequestPacket.encode(&mut out).is_err() || stream.write_all(&out).await.is_err() {
                    return StopReason::ConnectionLost;
                }
            }
            command = command_rx.recv() => {
                match command {
                    None => return StopReason::ConnectionLost,
                    Some(Command::Disconnect) => {
                        let mut out = Vec::new();
                        let _ = DisconnectPacket.encode(&mut out);
                        let _ = stream.write_all(&out).await;
                        stream.close().await;
                        return StopReason::UserDisconnected;
                    }
                    Some(command) => {
                        if handle_command(command, session, &mut stream).await.is_err() {
                            return StopReason::ConnectionLost;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_command(command: Command, session: &mut Session, stream: &mut Stream) -> Result<(), Error> {
    match command {
        Command::Publish {
            topic,
            payload,
            qos,
            retain,
            ack,
        } => {
            let mut packet = PublishPacket::new(&topic, qos, &payload, retain)?;
            if qos == QoS::AtMostOnce {
                send_packet(stream, &Packet::Publish(packet)).await?;
                let _ = ack.send(Ok(()));
            } else {
                let Some(pid) = session.next_pid() else {
                    let _ = ack.send(Err(Error::new(ErrorKind::ProtocolViolation, "packet id space exhausted")));
                    return Ok(());
                };
                packet = packet.with_packet_id(pid);
                send_packet(stream, &Packet::Publish(packet)).await?;
                session.begin_publish(pid, topic, payload, qos, retain, ack);
            }
            Ok(())
        }
        Command::Subscribe { filters, ack } => {
            let Some(pid) = session.next_pid() else {
                let _ = ack.send(Err(Error::new(ErrorKind::ProtocolViolation, "packet id space exhausted")));
                return Ok(());
            };
            let mut topics = Vec::with_capacity(filters.len());
            for (filter, qos) in filters {
                match SubscribeTopic::new(&filter, qos) {
                    Ok(topic) => topics.push(topic),
                    Err(err) => {
                        let _ = ack.send(Err(Error::new(ErrorKind::MalformedPacket, format!("{err:?}"))));
                        return Ok(());
                    }
                }
            }
            let packet = SubscribePacket::new(topics, pid);
            send_packet(stream, &Packet::Subscribe(packet)).await?;
            session.begin_subscribe(pid, ack);
            Ok(())
        }
        Command::Unsubscribe { filters, ack } => {
            let Some(pid) = session.next_pid() else {
                let _ = ack.send(Err(Error::new(ErrorKind::ProtocolViolation, "packet id space exhausted")));
                return Ok(());
            };
            let packet = UnsubscribePacket::new(filters, pid);
            send_packet(stream, &Packet::Unsubscribe(packet)).await?;
            session.begin_unsubscribe(pid, ack);
            Ok(())
        }
        Command::Disconnect => unreachable!("handled by the caller before dispatch"),
    }
}

async fn send_packet(stream: &mut Stream, packet: &Packet) -> Result<(), Error> {
    let mut buf = Vec::new();
    packet.encode(&mut buf)?;
    stream.write_all(&buf).await
}

async fn drain_packets(
    buf: &mut Vec<u8>,
    session: &mut Session,
    stream: &mut Stream,
    event_tx: &mpsc::Sender<Event>,
) -> Result<(), Error> {
    loop {
        match decode_packet(buf)? {
            Some((packet, consumed)) => {
                buf.drain(..consumed);
                handle_packet(packet, session, stream, event_tx).await?;
            }
            None => return Ok(()),
        }
    }
}

async fn handle_packet(
    packet: Packet,
    session: &mut Session,
    stream: &mut Stream,
    event_tx: &mpsc::Sender<Event>,
) -> Result<(), Error> {
    match packet {
        Packet::Publish(publish) => handle_incoming_publish(&publish, session, stream, event_tx).await,
        Packet::PublishAck(ack) => {
            session.on_puback(ack.packet_id());
            Ok(())
        }
        Packet::PublishReceived(rec) => {
            let pid = rec.packet_id();
            if session.on_pubrec(pid) {
                send_packet(stream, &Packet::PublishRelease(PublishReleasePacket::new(pid))).await?;
            }
            Ok(())
        }
        Packet::PublishRelease(rel) => {
            let pid = rel.packet_id();
            session.on_pubrel_from_broker(pid);
            send_packet(stream, &Packet::PublishComplete(PublishCompletePacket::new(pid))).await
        }
        Packet::PublishComplete(comp) => {
            session.on_pubcomp(comp.packet_id());
            Ok(())
        }
        Packet::SubscribeAck(suback) => {
            session.on_suback(suback.packet_id(), suback.acks().to_vec());
            Ok(())
        }
        Packet::UnsubscribeAck(unsuback) => {
            session.on_unsuback(unsuback.packet_id());
            Ok(())
        }
        Packet::PingResponse(_) => Ok(()),
        Packet::Connect(_) | Packet::ConnectAck(_) | Packet::Subscribe(_) | Packet::Unsubscribe(_) | Packet::Disconnect(_) | Packet::PingRequest(_) => {
            Err(Error::new(ErrorKind::ProtocolViolation, "unexpected packet type from broker"))
        }
    }
}

async fn handle_incoming_publish(
    publish: &PublishPacket,
    session: &mut Session,
    stream: &mut Stream,
    event_tx: &mpsc::Sender<Event>,
) -> Result<(), Error> {
    let deliver = match publish.qos() {
        QoS::AtMostOnce => true,
        QoS::AtLeastOnce => {
            if let Some(pid) = publish.packet_id() {
                send_packet(stream, &Packet::PublishAck(PublishAckPacket::new(pid))).await?;
            }
            true
        }
        QoS::ExactlyOnce => {
            let Some(pid) = publish.packet_id() else {
                return Err(Error::new(ErrorKind::ProtocolViolation, "QoS 2 PUBLISH missing packet id"));
            };
            let fresh = session.begin_inbound_qos2(pid);
            send_packet(stream, &Packet::PublishReceived(PublishReceivedPacket::new(pid))).await?;
            fresh
        }
    };

    if deliver {
        let _ = event_tx
            .send(Event::Message {
                topic: publish.topic().to_string(),
                payload: publish.payload().to_vec(),
                qos: publish.qos(),
                retain: publish.retain(),
            })
            .await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alive_secs_caps_at_u16_max() {
        let options = ConnectOptions::new("x").with_keep_alive(Duration::from_secs(u64::from(u16::MAX) + 10));
        assert_eq!(keep_alive_secs(&options), u16::MAX);
    }
}
