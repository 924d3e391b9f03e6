// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! An MQTT 3.1.1 client library: one task owns the transport and runs
//! keepalive/auto-reconnect, driven by a cloneable [`Client`] handle and
//! observed through an [`Event`] stream. Grounded on `ruo`, the
//! teacher's own companion client, restructured to match this
//! workspace's command/event actor style.

mod client;
mod commands;
pub mod connect_options;
pub mod error;
mod event;
mod session;
mod stream;

pub use client::Client;
pub use connect_options::{ConnectOptions, ConnectType, ReconnectPolicy, Will};
pub use error::{Error, ErrorKind};
pub use event::Event;
pub use mqtt_codec::{ConnectReturnCode, QoS, SubscribeAck};
