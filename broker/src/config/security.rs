// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

/// Authentication/authorization policy knobs. The plugins these select are
/// specified as traits (§4.7); their file/SQL-backed implementations are
/// out of scope.
#[derive(Debug, Clone, Deserialize)]
pub struct Security {
    #[serde(default = "Security::default_allow_anonymous")]
    allow_anonymous: bool,

    /// Ordered list of auth plugin names to load (§6's `auth.plugins`); the
    /// packaged backends behind these names are out of scope, so this is
    /// consulted only by collaborators that register their own names here.
    #[serde(default)]
    auth_plugins: Vec<String>,

    #[serde(default = "Security::default_topic_check_enabled")]
    topic_check_enabled: bool,

    /// Ordered list of topic-check plugin names (§6's `topic-check.plugins`).
    #[serde(default)]
    topic_check_plugins: Vec<String>,

    /// Per-call timeout in milliseconds for an auth/topic filter vote; a
    /// plugin exceeding this is treated as a deny.
    #[serde(default = "Security::default_plugin_timeout_ms")]
    plugin_timeout_ms: u64,
}

impl Security {
    #[must_use]
    pub const fn default_allow_anonymous() -> bool {
        true
    }

    #[must_use]
    pub const fn default_topic_check_enabled() -> bool {
        false
    }

    #[must_use]
    pub const fn default_plugin_timeout_ms() -> u64 {
        1000
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    #[must_use]
    pub fn auth_plugins(&self) -> &[String] {
        &self.auth_plugins
    }

    #[must_use]
    pub const fn topic_check_enabled(&self) -> bool {
        self.topic_check_enabled
    }

    #[must_use]
    pub fn topic_check_plugins(&self) -> &[String] {
        &self.topic_check_plugins
    }

    #[must_use]
    pub const fn plugin_timeout_ms(&self) -> u64 {
        self.plugin_timeout_ms
    }
}

impl Default for Security {
    fn default() -> Self {
        Self {
            allow_anonymous: Self::default_allow_anonymous(),
            auth_plugins: Vec::new(),
            topic_check_enabled: Self::default_topic_check_enabled(),
            topic_check_plugins: Vec::new(),
            plugin_timeout_ms: Self::default_plugin_timeout_ms(),
        }
    }
}
