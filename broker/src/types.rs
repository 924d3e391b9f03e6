// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use mqtt_codec::QoS;

/// Identifies one configured listener (a bind address + protocol).
pub type ListenerId = u32;

/// Identifies one live TCP/TLS/WS connection. Unlike `ClientId`, this
/// changes on every reconnect -- it is how the dispatcher addresses an
/// in-memory mpsc sender, not how sessions are keyed.
pub type ConnId = u64;

/// The MQTT client identifier, the session store's key.
pub type ClientId = String;

/// The logical message routed between sessions, as distinct from the wire
/// PUBLISH: one `ApplicationMessage` may fan out into several PUBLISH
/// packets, one per subscriber, each with its own packet id and QoS
/// downgraded to `min(self.qos, subscriber.max_qos)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub source_client_id: ClientId,
}

/// Why a connection or session ended; threaded through to plugin events
/// and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientRequested,
    KeepaliveTimeout,
    SessionTakenOver,
    ProtocolViolation,
    ServerShutdown,
    ConnectionLost,
}

impl DisconnectReason {
    #[must_use]
    pub const fn is_abnormal(self) -> bool {
        !matches!(self, Self::ClientRequested)
    }
}
