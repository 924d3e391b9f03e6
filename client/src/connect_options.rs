// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Grounded on `ruo/src/connect_options.rs`, trimmed of the proxy/HTTP
//! tunnel types (no proxy support is in scope here) and extended with a
//! reconnection backoff policy the teacher's client never had.

use std::time::Duration;

use mqtt_codec::QoS;
use rand::Rng;

/// Transport a client connects over. Only `Mqtt`/`Mqtts` are implemented;
/// `Ws`/`Wss` are a broker-only feature in this workspace (clients speak
/// plain or TLS TCP), noted as a scope decision in DESIGN.md.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectType {
    Mqtt,
    Mqtts { server_name: String },
}

#[derive(Clone, Debug)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Exponential backoff with jitter, applied between reconnect attempts.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Backoff for the `attempt`-th retry (0-indexed), doubled each time
    /// up to `max_backoff` and jittered by +/-20% to avoid a thundering
    /// herd of clients reconnecting in lockstep.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let doubled = self.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = doubled.min(self.max_backoff);
        let jitter_frac = rand::rng().random_range(0.8..1.2);
        capped.mul_f64(jitter_frac)
    }
}

fn random_client_id() -> String {
    let suffix: u64 = rand::rng().random();
    format!("mqtt-client-{suffix:x}")
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    address: String,
    connect_type: ConnectType,
    client_id: String,
    clean_session: bool,
    keep_alive: Duration,
    connect_timeout: Duration,
    username: Option<String>,
    password: Vec<u8>,
    will: Option<Will>,
    reconnect: ReconnectPolicy,
}

impl ConnectOptions {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_type: ConnectType::Mqtt,
            client_id: random_client_id(),
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            username: None,
            password: Vec::new(),
            will: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    #[must_use]
    pub const fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<Vec<u8>>) -> Self {
        self.username = Some(username.into());
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_will(mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS, retain: bool) -> Self {
        self.will = Some(Will {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        });
        self
    }

    #[must_use]
    pub const fn with_connect_type(mut self, connect_type: ConnectType) -> Self {
        self.connect_type = connect_type;
        self
    }

    #[must_use]
    pub const fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn connect_type(&self) -> &ConnectType {
        &self.connect_type
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> &[u8] {
        &self.password
    }

    #[must_use]
    pub const fn will(&self) -> Option<&Will> {
        self.will.as_ref()
    }

    #[must_use]
    pub const fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.reconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            max_attempts: None,
        };
        assert!(policy.backoff_for(0) < Duration::from_millis(130));
        assert!(policy.backoff_for(1) < Duration::from_millis(260));
        assert!(policy.backoff_for(10) <= Duration::from_millis(420));
    }

    #[test]
    fn default_client_id_is_non_empty_and_varies() {
        let a = ConnectOptions::new("127.0.0.1:1883");
        let b = ConnectOptions::new("127.0.0.1:1883");
        assert!(!a.client_id().is_empty());
        assert_ne!(a.client_id(), b.client_id());
    }
}
