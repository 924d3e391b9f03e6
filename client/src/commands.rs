// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use mqtt_codec::{QoS, SubscribeAck};
use tokio::sync::oneshot;

use crate::error::Error;

/// Sent from the public [`crate::client::Client`] handle to the connection
/// task it owns. Mirrors `broker::commands::ToDispatcher` in spirit: the
/// public handle never touches the transport directly.
pub enum Command {
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        ack: oneshot::Sender<Result<(), Error>>,
    },
    Subscribe {
        filters: Vec<(String, QoS)>,
        ack: oneshot::Sender<Result<Vec<SubscribeAck>, Error>>,
    },
    Unsubscribe {
        filters: Vec<String>,
        ack: oneshot::Sender<Result<(), Error>>,
    },
    Disconnect,
}
