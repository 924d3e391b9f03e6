// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The C7 plugin surface: authentication, topic ACL, and a fire-and-forget
//! event sink. Grounded on `hebo`'s `AuthApp` actor
//! (`hebo/src/auth/mod.rs`), but simplified from a separate actor with its
//! own command channel into trait objects the dispatcher calls inline --
//! the dispatcher already serializes every state mutation, so a second
//! actor would only add a channel hop with no concurrency benefit.

use std::time::Duration;

use mqtt_codec::QoS;
use tokio::time::timeout;

use crate::types::{ClientId, DisconnectReason};

/// Votes on whether a CONNECT's credentials are acceptable. Implementors
/// may be async (DB/LDAP lookups); a slow or hung call is treated as a
/// deny once `plugin_timeout_ms` elapses (spec §4.7).
#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate(&self, client_id: &str, username: Option<&str>, password: Option<&[u8]>) -> bool;
}

/// Votes on whether a client may publish to, or subscribe to, a topic.
#[async_trait::async_trait]
pub trait AclBackend: Send + Sync {
    async fn can_publish(&self, client_id: &str, topic: &str) -> bool;
    async fn can_subscribe(&self, client_id: &str, filter: &str) -> bool;
}

/// Fire-and-forget notification of broker lifecycle events. Unlike the
/// auth/ACL votes, a slow or failing sink never blocks or denies anything.
pub trait EventSink: Send + Sync {
    fn on_client_connected(&self, client_id: &ClientId) {
        let _ = client_id;
    }
    fn on_client_disconnected(&self, client_id: &ClientId, reason: DisconnectReason) {
        let _ = (client_id, reason);
    }
    fn on_message_published(&self, client_id: &ClientId, topic: &str) {
        let _ = (client_id, topic);
    }
}

/// Always accepts: the reference backend used when `allow_anonymous` is
/// set and no other backend is configured.
pub struct AllowAllAuth;

#[async_trait::async_trait]
impl AuthBackend for AllowAllAuth {
    async fn authenticate(&self, _client_id: &str, _username: Option<&str>, _password: Option<&[u8]>) -> bool {
        true
    }
}

/// Always accepts: the reference ACL used when `topic_check_enabled` is
/// false.
pub struct AllowAllAcl;

#[async_trait::async_trait]
impl AclBackend for AllowAllAcl {
    async fn can_publish(&self, _client_id: &str, _topic: &str) -> bool {
        true
    }
    async fn can_subscribe(&self, _client_id: &str, _filter: &str) -> bool {
        true
    }
}

/// In-memory username/password table, for tests and small deployments
/// that don't need `hebo`'s file/DB-backed auth.
#[derive(Default)]
pub struct InMemoryAuth {
    credentials: std::collections::HashMap<String, Vec<u8>>,
}

impl InMemoryAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<Vec<u8>>) {
        self.credentials.insert(username.into(), password.into());
    }
}

#[async_trait::async_trait]
impl AuthBackend for InMemoryAuth {
    async fn authenticate(&self, _client_id: &str, username: Option<&str>, password: Option<&[u8]>) -> bool {
        match (username, password) {
            (Some(user), Some(pass)) => self.credentials.get(user).is_some_and(|expected| expected == pass),
            _ => false,
        }
    }
}

/// Bundles the configured plugins and applies spec §4.7's vote semantics:
/// authentication is a single backend; ACL and event fan-out are a list
/// evaluated with logical AND across concurrent calls, collapsing an
/// empty backend list to allow (when topic checking is disabled) or the
/// caller's chosen default.
pub struct PluginHost {
    auth: Box<dyn AuthBackend>,
    acls: Vec<Box<dyn AclBackend>>,
    events: Vec<Box<dyn EventSink>>,
    timeout: Duration,
}

impl PluginHost {
    #[must_use]
    pub fn new(auth: Box<dyn AuthBackend>, acls: Vec<Box<dyn AclBackend>>, timeout_ms: u64) -> Self {
        Self {
            auth,
            acls,
            events: Vec::new(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn add_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.events.push(sink);
    }

    /// A hung auth call is treated as a deny once `plugin_timeout_ms`
    /// elapses, per spec §4.7.
    pub async fn authenticate(&self, client_id: &str, username: Option<&str>, password: Option<&[u8]>) -> bool {
        match timeout(self.timeout, self.auth.authenticate(client_id, username, password)).await {
            Ok(allowed) => allowed,
            Err(_elapsed) => false,
        }
    }

    /// Logical AND across every configured ACL backend; an empty list
    /// allows (spec §4.7: "no ACL plugins configured" is not itself a
    /// denial -- `topic_check_enabled` gates whether any are loaded).
    pub async fn can_publish(&self, client_id: &str, topic: &str) -> bool {
        for acl in &self.acls {
            match timeout(self.timeout, acl.can_publish(client_id, topic)).await {
                Ok(true) => {}
                _ => return false,
            }
        }
        true
    }

    pub async fn can_subscribe(&self, client_id: &str, filter: &str) -> bool {
        for acl in &self.acls {
            match timeout(self.timeout, acl.can_subscribe(client_id, filter)).await {
                Ok(true) => {}
                _ => return false,
            }
        }
        true
    }

    pub fn notify_connected(&self, client_id: &ClientId) {
        for sink in &self.events {
            sink.on_client_connected(client_id);
        }
    }

    pub fn notify_disconnected(&self, client_id: &ClientId, reason: DisconnectReason) {
        for sink in &self.events {
            sink.on_client_disconnected(client_id, reason);
        }
    }

    pub fn notify_published(&self, client_id: &ClientId, topic: &str) {
        for sink in &self.events {
            sink.on_message_published(client_id, topic);
        }
    }
}

/// Granted QoS for a subscription request: `min(requested, max configured
/// for this listener/backend)`. Currently a passthrough; kept as a named
/// seam for a future per-topic QoS cap plugin.
#[must_use]
pub const fn grant_qos(requested: QoS) -> QoS {
    requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_auth_checks_password() {
        let mut auth = InMemoryAuth::new();
        auth.add_user("alice", b"secret".to_vec());
        assert!(auth.authenticate("c1", Some("alice"), Some(b"secret")).await);
        assert!(!auth.authenticate("c1", Some("alice"), Some(b"wrong")).await);
        assert!(!auth.authenticate("c1", None, None).await);
    }

    #[tokio::test]
    async fn acl_list_is_logical_and() {
        struct DenyAll;
        #[async_trait::async_trait]
        impl AclBackend for DenyAll {
            async fn can_publish(&self, _c: &str, _t: &str) -> bool {
                false
            }
            async fn can_subscribe(&self, _c: &str, _f: &str) -> bool {
                false
            }
        }

        let host = PluginHost::new(
            Box::new(AllowAllAuth),
            vec![Box::new(AllowAllAcl), Box::new(DenyAll)],
            1000,
        );
        assert!(!host.can_publish("c1", "a/b").await);
    }

    #[tokio::test]
    async fn empty_acl_list_allows() {
        let host = PluginHost::new(Box::new(AllowAllAuth), vec![], 1000);
        assert!(host.can_publish("c1", "a/b").await);
    }
}
