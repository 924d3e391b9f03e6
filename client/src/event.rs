// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use mqtt_codec::QoS;

/// Pushed to the caller's event channel as the connection's state changes
/// or a message arrives. Unlike `ruo`'s single `on_connect_callback`, every
/// lifecycle transition is surfaced here so a caller can observe
/// reconnects without polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connected { session_present: bool },
    Message {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    Disconnected,
    Reconnecting { attempt: u32 },
    ReconnectFailed,
}
