// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The two command enums flowing between a connection task (C2+C3) and
//! the single dispatcher task (C4+C5+C6-policy+C7), one per direction.
//! Grounded on `hebo/src/commands.rs`'s per-direction-enum idiom, but
//! trimmed from its listener/session/auth/backend/bridge topology down to
//! the two actors this broker's simplified design actually runs.

use std::net::SocketAddr;

use mqtt_codec::Packet;
use tokio::sync::mpsc;

use crate::types::{ConnId, DisconnectReason, ListenerId};

/// Sent by a connection task (or the accept loop, for `NewConnection`) to
/// the dispatcher.
#[derive(Debug)]
pub enum ToDispatcher {
    /// A new transport-level connection was accepted; registers the
    /// reverse channel the dispatcher uses to talk back to it. Sent once,
    /// before any `Packet` for this `conn_id`.
    NewConnection {
        conn_id: ConnId,
        listener_id: ListenerId,
        listener_keep_alive: u16,
        peer_addr: Option<SocketAddr>,
        sender: mpsc::Sender<ToConnection>,
    },
    /// A fully decoded packet arrived on this connection.
    Packet { conn_id: ConnId, packet: Packet },
    /// The connection's I/O loop ended (EOF, error, or keepalive
    /// timeout). `reason` distinguishes a clean DISCONNECT (tracked by
    /// the connection task itself before this fires) from everything
    /// else, which the dispatcher treats as abnormal for will purposes.
    Closed {
        conn_id: ConnId,
        reason: DisconnectReason,
    },
}

/// Sent by the dispatcher to one connection task.
#[derive(Debug)]
pub enum ToConnection {
    /// Write this packet out on the wire.
    Send(Packet),
    /// Close the connection after flushing any already-queued sends.
    Close(DisconnectReason),
}
