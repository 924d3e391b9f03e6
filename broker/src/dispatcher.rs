// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The single dispatcher task: owns the session store, the subscription
//! trie, and the retained message map, and makes every C7 plugin call.
//! Grounded on `hebo`'s dispatcher (`hebo/src/dispatcher/mod.rs`), but
//! collapsed from several cooperating actors into one, since spec §5
//! mandates a single logical execution context for broker state and the
//! teacher's own split buys it nothing but channel hops for this scope.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mqtt_codec::{
    ConnectAckPacket, ConnectReturnCode, Packet, PingResponsePacket, PublishAckPacket,
    PublishCompletePacket, PublishPacket, PublishReceivedPacket, PublishReleasePacket, QoS,
    SubscribeAck, SubscribeAckPacket, UnsubscribeAckPacket,
};
use tokio::sync::mpsc;
use tokio::time::interval;

use mqtt_codec::ProtocolLevel;

use crate::commands::{ToConnection, ToDispatcher};
use crate::config::Config;
use crate::plugin::PluginHost;
use crate::retained::RetainedStore;
use crate::session::{Session, Will};
use crate::trie::SubscriptionTrie;
use crate::types::{ApplicationMessage, ClientId, ConnId, DisconnectReason, ListenerId};

struct ConnEntry {
    sender: mpsc::Sender<ToConnection>,
    client_id: Option<ClientId>,
    listener_id: ListenerId,
}

/// Runs until its receiver is dropped (i.e. every connection and the
/// server's own handle have gone away).
pub struct Dispatcher {
    config: Config,
    plugins: PluginHost,
    receiver: mpsc::Receiver<ToDispatcher>,

    conns: HashMap<ConnId, ConnEntry>,
    sessions: HashMap<ClientId, Session>,
    trie: SubscriptionTrie,
    retained: RetainedStore,

    started_at: Instant,
    messages_received: u64,
    messages_sent: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: Config, plugins: PluginHost, receiver: mpsc::Receiver<ToDispatcher>) -> Self {
        Self {
            config,
            plugins,
            receiver,
            conns: HashMap::new(),
            sessions: HashMap::new(),
            trie: SubscriptionTrie::new(),
            retained: RetainedStore::new(),
            started_at: Instant::now(),
            messages_received: 0,
            messages_sent: 0,
        }
    }

    pub async fn run(mut self) {
        let sys_interval = self.config.general().sys_interval();
        if sys_interval == 0 {
            while let Some(cmd) = self.receiver.recv().await {
                self.handle(cmd).await;
            }
            return;
        }

        let mut sys_tick = interval(Duration::from_secs(sys_interval));
        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => break,
                    }
                }
                _ = sys_tick.tick() => {
                    self.publish_sys_metrics().await;
                }
            }
        }
    }

    async fn handle(&mut self, cmd: ToDispatcher) {
        match cmd {
            ToDispatcher::NewConnection {
                conn_id,
                listener_id,
                listener_keep_alive: _,
                peer_addr: _,
                sender,
            } => {
                self.conns.insert(
                    conn_id,
                    ConnEntry {
                        sender,
                        client_id: None,
                        listener_id,
                    },
                );
            }
            ToDispatcher::Packet { conn_id, packet } => {
                self.handle_packet(conn_id, packet).await;
            }
            ToDispatcher::Closed { conn_id, reason } => {
                self.handle_closed(conn_id, reason).await;
            }
        }
    }

    async fn handle_packet(&mut self, conn_id: ConnId, packet: Packet) {
        let established = self.client_id_of(conn_id).is_some();
        let is_connect = matches!(packet, Packet::Connect(_));

        // The first packet on a connection MUST be CONNECT, and a second
        // CONNECT on an already-established connection is itself a
        // protocol violation [MQTT-3.1.0-2].
        if established == is_connect {
            self.close_conn(conn_id, DisconnectReason::ProtocolViolation).await;
            return;
        }

        match packet {
            Packet::Connect(connect) => self.handle_connect(conn_id, connect).await,
            Packet::Publish(publish) => self.handle_publish(conn_id, publish).await,
            Packet::PublishAck(ack) => self.handle_puback(conn_id, ack),
            Packet::PublishReceived(rec) => self.handle_pubrec(conn_id, rec).await,
            Packet::PublishRelease(rel) => self.handle_pubrel(conn_id, rel).await,
            Packet::PublishComplete(comp) => self.handle_pubcomp(conn_id, comp),
            Packet::Subscribe(sub) => self.handle_subscribe(conn_id, sub).await,
            Packet::Unsubscribe(unsub) => self.handle_unsubscribe(conn_id, unsub).await,
            Packet::PingRequest(_) => self.handle_pingreq(conn_id).await,
            Packet::Disconnect(_) => self.handle_disconnect(conn_id).await,
            // Acks the broker never receives as a server and the wrong
            // direction for CONNACK/SUBACK/UNSUBACK/PINGRESP: a connection
            // task never forwards these, so reaching here is a protocol
            // violation the connection task should already have rejected.
            _ => {
                self.close_conn(conn_id, DisconnectReason::ProtocolViolation).await;
            }
        }
    }

    async fn handle_connect(&mut self, conn_id: ConnId, connect: mqtt_codec::ConnectPacket) {
        if connect.protocol_level() != ProtocolLevel::V311 {
            self.send_connack(conn_id, false, ConnectReturnCode::UnacceptableProtocolVersion)
                .await;
            self.close_conn(conn_id, DisconnectReason::ProtocolViolation).await;
            return;
        }

        let allowed = self
            .plugins
            .authenticate(connect.client_id(), connect.username(), {
                if connect.connect_flags().has_password {
                    Some(connect.password())
                } else {
                    None
                }
            })
            .await;

        if !allowed {
            self.send_connack(conn_id, false, ConnectReturnCode::NotAuthorized)
                .await;
            self.close_conn(conn_id, DisconnectReason::ProtocolViolation).await;
            return;
        }

        let client_id = if connect.client_id().is_empty() {
            format!("anon-{conn_id}")
        } else {
            connect.client_id().to_string()
        };

        // Session takeover: an existing live connection for this
        // client_id is forcibly closed (spec §4.4).
        if let Some(existing) = self.sessions.get(&client_id) {
            if let Some(old_conn_id) = existing.conn_id {
                self.close_conn(old_conn_id, DisconnectReason::SessionTakenOver).await;
            }
        }

        let clean_session = connect.connect_flags().clean_session;
        let session_present = if clean_session {
            self.destroy_session(&client_id);
            false
        } else {
            self.sessions.contains_key(&client_id)
        };

        let queue_capacity = self.config.general().max_queued_messages();
        let session = self
            .sessions
            .entry(client_id.clone())
            .or_insert_with(|| Session::new(client_id.clone(), clean_session, connect.keep_alive(), queue_capacity));
        session.clean_session = clean_session;
        session.keep_alive = connect.keep_alive();
        session.conn_id = Some(conn_id);
        session.will = if connect.connect_flags().has_will {
            connect.will_topic().map(|topic| Will {
                topic: topic.to_string(),
                payload: connect.will_message().to_vec(),
                qos: connect.connect_flags().will_qos,
                retain: connect.connect_flags().will_retain,
            })
        } else {
            None
        };

        if let Some(entry) = self.conns.get_mut(&conn_id) {
            entry.client_id = Some(client_id.clone());
        }

        self.plugins.notify_connected(&client_id);
        self.send_connack(conn_id, session_present, ConnectReturnCode::Accepted)
            .await;
        self.replay_session(&client_id).await;
    }

    async fn send_connack(&mut self, conn_id: ConnId, session_present: bool, code: ConnectReturnCode) {
        let packet = Packet::ConnectAck(ConnectAckPacket::new(session_present, code));
        self.send_to_conn(conn_id, packet).await;
    }

    /// Replays queued messages and in-flight QoS > 0 state accumulated
    /// while the session was detached (spec §4.4).
    async fn replay_session(&mut self, client_id: &ClientId) {
        let Some(session) = self.sessions.get(client_id) else {
            return;
        };
        let conn_id = match session.conn_id {
            Some(id) => id,
            None => return,
        };

        let (pubrels, publishes) = session.replay_outbound();
        for pid in pubrels {
            let packet = Packet::PublishRelease(PublishReleasePacket::new(pid));
            self.send_to_conn(conn_id, packet).await;
        }
        for (pid, topic, payload, qos, retain) in publishes {
            let publish = PublishPacket::new(&topic, qos, &payload, retain)
                .expect("topic was already validated when first routed")
                .with_packet_id(pid)
                .with_dup(true);
            self.send_to_conn(conn_id, Packet::Publish(publish)).await;
        }

        let backlog: Vec<ApplicationMessage> = self
            .sessions
            .get_mut(client_id)
            .map(|s| s.queued_messages.drain(..).collect())
            .unwrap_or_default();
        for message in backlog {
            self.deliver_to_session(client_id, &message).await;
        }
    }

    async fn handle_publish(&mut self, conn_id: ConnId, publish: PublishPacket) {
        let Some(client_id) = self.client_id_of(conn_id) else {
            return;
        };

        if !self.plugins.can_publish(&client_id, publish.topic()).await {
            self.close_conn(conn_id, DisconnectReason::ProtocolViolation).await;
            return;
        }

        self.messages_received += 1;

        // QoS 2 inbound dedup: a retransmitted PUBLISH must not be routed
        // twice, only re-acked.
        let already_routed = publish.qos() == QoS::ExactlyOnce
            && publish.packet_id().is_some_and(|pid| {
                self.sessions
                    .get_mut(&client_id)
                    .is_some_and(|s| !s.begin_inbound_qos2(pid))
            });

        if !already_routed {
            if publish.retain() {
                self.retained
                    .apply(publish.topic(), publish.payload().to_vec(), publish.qos());
            }
            self.plugins.notify_published(&client_id, publish.topic());
            let message = ApplicationMessage {
                topic: publish.topic().to_string(),
                payload: publish.payload().to_vec(),
                qos: publish.qos(),
                retain: publish.retain(),
                source_client_id: client_id.clone(),
            };
            self.route(&message).await;
        }

        match publish.qos() {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                if let Some(pid) = publish.packet_id() {
                    let ack = Packet::PublishAck(PublishAckPacket::new(pid));
                    self.send_to_conn(conn_id, ack).await;
                }
            }
            QoS::ExactlyOnce => {
                if let Some(pid) = publish.packet_id() {
                    let ack = Packet::PublishReceived(PublishReceivedPacket::new(pid));
                    self.send_to_conn(conn_id, ack).await;
                }
            }
        }
    }

    /// Fans `message` out to every matching subscriber, downgrading QoS
    /// to `min(message.qos, subscriber.max_qos)` per subscriber (spec
    /// §4.5).
    async fn route(&mut self, message: &ApplicationMessage) {
        let matches = self.trie.matching(&message.topic);
        for (client_id, max_qos) in matches {
            self.deliver_with_qos(&client_id, message, message.qos.min(max_qos)).await;
        }
    }

    async fn deliver_to_session(&mut self, client_id: &ClientId, message: &ApplicationMessage) {
        let qos = self
            .sessions
            .get(client_id)
            .and_then(|s| s.subscriptions.get(&message.topic).copied())
            .unwrap_or(message.qos)
            .min(message.qos);
        self.deliver_with_qos(client_id, message, qos).await;
    }

    async fn deliver_with_qos(&mut self, client_id: &ClientId, message: &ApplicationMessage, qos: QoS) {
        let conn_id = self.sessions.get(client_id).and_then(|s| s.conn_id);
        let Some(conn_id) = conn_id else {
            if let Some(session) = self.sessions.get_mut(client_id) {
                session.enqueue_detached(message.clone());
            }
            return;
        };

        let publish = match qos {
            QoS::AtMostOnce => {
                PublishPacket::new(&message.topic, qos, &message.payload, false)
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let Some(session) = self.sessions.get_mut(client_id) else {
                    return;
                };
                let Some(pid) = session.begin_outbound(
                    message.topic.clone(),
                    message.payload.clone(),
                    qos,
                    false,
                ) else {
                    return;
                };
                PublishPacket::new(&message.topic, qos, &message.payload, false)
                    .map(|p| p.with_packet_id(pid))
            }
        };

        if let Ok(publish) = publish {
            self.messages_sent += 1;
            self.send_to_conn(conn_id, Packet::Publish(publish)).await;
        }
    }

    fn handle_puback(&mut self, conn_id: ConnId, ack: PublishAckPacket) {
        if let Some(client_id) = self.client_id_of(conn_id) {
            if let Some(session) = self.sessions.get_mut(&client_id) {
                session.on_puback(ack.packet_id());
            }
        }
    }

    async fn handle_pubrec(&mut self, conn_id: ConnId, rec: PublishReceivedPacket) {
        if let Some(client_id) = self.client_id_of(conn_id) {
            if let Some(session) = self.sessions.get_mut(&client_id) {
                session.on_pubrec(rec.packet_id());
            }
        }
        let release = Packet::PublishRelease(PublishReleasePacket::new(rec.packet_id()));
        self.send_to_conn(conn_id, release).await;
    }

    async fn handle_pubrel(&mut self, conn_id: ConnId, rel: PublishReleasePacket) {
        if let Some(client_id) = self.client_id_of(conn_id) {
            if let Some(session) = self.sessions.get_mut(&client_id) {
                session.on_pubrel(rel.packet_id());
            }
        }
        let complete = Packet::PublishComplete(PublishCompletePacket::new(rel.packet_id()));
        self.send_to_conn(conn_id, complete).await;
    }

    fn handle_pubcomp(&mut self, conn_id: ConnId, comp: PublishCompletePacket) {
        if let Some(client_id) = self.client_id_of(conn_id) {
            if let Some(session) = self.sessions.get_mut(&client_id) {
                session.on_pubcomp(comp.packet_id());
            }
        }
    }

    async fn handle_subscribe(&mut self, conn_id: ConnId, subscribe: mqtt_codec::SubscribePacket) {
        let Some(client_id) = self.client_id_of(conn_id) else {
            return;
        };

        let mut acks = Vec::with_capacity(subscribe.topics().len());
        let mut granted: Vec<(String, QoS)> = Vec::new();
        for topic in subscribe.topics() {
            if self.plugins.can_subscribe(&client_id, topic.topic()).await {
                let qos = crate::plugin::grant_qos(topic.qos());
                acks.push(SubscribeAck::Success(qos));
                granted.push((topic.topic().to_string(), qos));
            } else {
                acks.push(SubscribeAck::Failure);
            }
        }

        for (filter, qos) in &granted {
            self.trie.subscribe(&client_id, filter, *qos);
            if let Some(session) = self.sessions.get_mut(&client_id) {
                session.subscriptions.insert(filter.clone(), *qos);
            }
        }

        let suback = Packet::SubscribeAck(SubscribeAckPacket::new(acks, subscribe.packet_id()));
        self.send_to_conn(conn_id, suback).await;

        for (filter, qos) in granted {
            let retained = self.retained.matching(&filter);
            for (topic, msg) in retained {
                let message = ApplicationMessage {
                    topic,
                    payload: msg.payload,
                    qos: msg.qos.min(qos),
                    retain: true,
                    source_client_id: client_id.clone(),
                };
                self.deliver_with_qos(&client_id, &message, message.qos).await;
            }
        }
    }

    async fn handle_unsubscribe(&mut self, conn_id: ConnId, unsubscribe: mqtt_codec::UnsubscribePacket) {
        let Some(client_id) = self.client_id_of(conn_id) else {
            return;
        };
        for filter in unsubscribe.topics() {
            self.trie.unsubscribe(&client_id, filter);
            if let Some(session) = self.sessions.get_mut(&client_id) {
                session.subscriptions.remove(filter);
            }
        }
        let ack = Packet::UnsubscribeAck(UnsubscribeAckPacket::new(unsubscribe.packet_id()));
        self.send_to_conn(conn_id, ack).await;
    }

    async fn handle_pingreq(&mut self, conn_id: ConnId) {
        self.send_to_conn(conn_id, Packet::PingResponse(PingResponsePacket)).await;
    }

    async fn handle_disconnect(&mut self, conn_id: ConnId) {
        if let Some(client_id) = self.client_id_of(conn_id) {
            if let Some(session) = self.sessions.get_mut(&client_id) {
                // A clean DISCONNECT discards any armed will.
                session.will = None;
            }
        }
        self.handle_closed(conn_id, DisconnectReason::ClientRequested).await;
    }

    async fn handle_closed(&mut self, conn_id: ConnId, reason: DisconnectReason) {
        let Some(entry) = self.conns.remove(&conn_id) else {
            return;
        };
        let Some(client_id) = entry.client_id else {
            return;
        };

        let will = self
            .sessions
            .get(&client_id)
            .filter(|s| s.conn_id == Some(conn_id))
            .and_then(|s| s.will.clone());

        if reason.is_abnormal() {
            if let Some(will) = will {
                let message = ApplicationMessage {
                    topic: will.topic.clone(),
                    payload: will.payload,
                    qos: will.qos,
                    retain: will.retain,
                    source_client_id: client_id.clone(),
                };
                if will.retain {
                    self.retained.apply(&will.topic, message.payload.clone(), will.qos);
                }
                self.route(&message).await;
            }
        }

        self.plugins.notify_disconnected(&client_id, reason);

        if let Some(session) = self.sessions.get_mut(&client_id) {
            if session.conn_id == Some(conn_id) {
                session.conn_id = None;
            }
        }

        let clean_session = self.sessions.get(&client_id).is_some_and(|s| s.clean_session);
        if clean_session {
            self.destroy_session(&client_id);
        }
    }

    fn destroy_session(&mut self, client_id: &ClientId) {
        if let Some(session) = self.sessions.remove(client_id) {
            let filters: Vec<String> = session.subscriptions.keys().cloned().collect();
            self.trie.remove_session(client_id, &filters);
        }
    }

    /// DISCONNECT is client-to-server only in MQTT 3.1.1; a server-initiated
    /// close just drops the transport (`ToConnection::Close`), it never
    /// sends a packet first.
    async fn close_conn(&mut self, conn_id: ConnId, reason: DisconnectReason) {
        if let Some(entry) = self.conns.get(&conn_id) {
            let _ = entry.sender.send(ToConnection::Close(reason)).await;
        }
    }

    async fn send_to_conn(&mut self, conn_id: ConnId, packet: Packet) {
        if let Some(entry) = self.conns.get(&conn_id) {
            if entry.sender.send(ToConnection::Send(packet)).await.is_err() {
                self.conns.remove(&conn_id);
            }
        }
    }

    fn client_id_of(&self, conn_id: ConnId) -> Option<ClientId> {
        self.conns.get(&conn_id).and_then(|e| e.client_id.clone())
    }

    /// Publishes the `$SYS` metrics tree as retained messages, matching
    /// spec's supplemented `$SYS` feature (grounded on
    /// `hebo/src/metrics.rs` / `sys_messages.rs`).
    async fn publish_sys_metrics(&mut self) {
        let uptime = self.started_at.elapsed().as_secs();
        let entries = [
            ("$SYS/broker/uptime", uptime.to_string()),
            ("$SYS/broker/clients/total", self.sessions.len().to_string()),
            (
                "$SYS/broker/clients/connected",
                self.sessions.values().filter(|s| s.is_attached()).count().to_string(),
            ),
            ("$SYS/broker/messages/received", self.messages_received.to_string()),
            ("$SYS/broker/messages/sent", self.messages_sent.to_string()),
        ];

        for (topic, value) in entries {
            let payload = value.into_bytes();
            self.retained.apply(topic, payload.clone(), QoS::AtMostOnce);
            let message = ApplicationMessage {
                topic: topic.to_string(),
                payload,
                qos: QoS::AtMostOnce,
                retain: true,
                source_client_id: "$SYS".to_string(),
            };
            self.route(&message).await;
        }
    }
}
