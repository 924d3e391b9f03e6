// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::path::PathBuf;

use serde::Deserialize;

/// Binding protocol for one listener.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    #[serde(alias = "mqtt")]
    Mqtt,
    #[serde(alias = "mqtts")]
    Mqtts,
    #[serde(alias = "ws")]
    Ws,
    #[serde(alias = "wss")]
    Wss,
}

/// One bind address + protocol combination the broker accepts connections
/// on.
#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    #[serde(default = "Listener::default_address")]
    address: String,

    #[serde(default = "Listener::default_protocol")]
    protocol: Protocol,

    /// `0` means unlimited.
    #[serde(default = "Listener::default_max_connections")]
    max_connections: usize,

    #[serde(default = "Listener::default_keep_alive")]
    keep_alive: u16,

    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
}

impl Listener {
    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub fn default_address() -> String {
        "0.0.0.0:1883".to_string()
    }

    #[must_use]
    pub const fn default_protocol() -> Protocol {
        Protocol::Mqtt
    }

    #[must_use]
    pub const fn default_max_connections() -> usize {
        0
    }

    #[must_use]
    pub const fn default_keep_alive() -> u16 {
        60
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&std::path::Path> {
        self.cert_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&std::path::Path> {
        self.key_file.as_deref()
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.protocol, Protocol::Mqtts | Protocol::Wss)
    }

    #[must_use]
    pub const fn is_websocket(&self) -> bool {
        matches!(self.protocol, Protocol::Ws | Protocol::Wss)
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            protocol: Self::default_protocol(),
            max_connections: Self::default_max_connections(),
            keep_alive: Self::default_keep_alive(),
            cert_file: None,
            key_file: None,
        }
    }
}
