// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

/// Broker-wide settings that apply across all listeners.
#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Grace period in seconds given to writer queues to drain during
    /// shutdown before handlers are force-closed.
    #[serde(default = "General::default_shutdown_grace_period")]
    shutdown_grace_period: u64,

    /// Interval in seconds at which `$SYS/broker/...` metrics are
    /// republished. `0` disables the sys tree entirely.
    #[serde(default = "General::default_sys_interval")]
    sys_interval: u64,

    /// Bounded depth of a session's queued-message backlog while detached.
    #[serde(default = "General::default_max_queued_messages")]
    max_queued_messages: usize,
}

impl General {
    #[must_use]
    pub const fn default_shutdown_grace_period() -> u64 {
        5
    }

    #[must_use]
    pub const fn default_sys_interval() -> u64 {
        10
    }

    #[must_use]
    pub const fn default_max_queued_messages() -> usize {
        1000
    }

    #[must_use]
    pub const fn shutdown_grace_period(&self) -> u64 {
        self.shutdown_grace_period
    }

    #[must_use]
    pub const fn sys_interval(&self) -> u64 {
        self.sys_interval
    }

    #[must_use]
    pub const fn max_queued_messages(&self) -> usize {
        self.max_queued_messages
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            shutdown_grace_period: Self::default_shutdown_grace_period(),
            sys_interval: Self::default_sys_interval(),
            max_queued_messages: Self::default_max_queued_messages(),
        }
    }
}
