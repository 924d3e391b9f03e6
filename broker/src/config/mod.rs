// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::net::ToSocketAddrs;

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

mod general;
mod listener;
mod log;
mod security;

pub use general::General;
pub use listener::{Listener, Protocol};
pub use log::{Log, LogLevel};
pub use security::Security;

/// Top-level broker configuration, as loaded from a TOML file or built up
/// in tests.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    general: General,

    #[serde(default = "Listener::default_listeners")]
    listeners: Vec<Listener>,

    #[serde(default)]
    security: Security,

    #[serde(default)]
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Parses a TOML configuration document.
    ///
    /// # Errors
    /// Returns an error if the document is not valid TOML or fails
    /// [`Config::validate`].
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content)
            .map_err(|err| Error::new(ErrorKind::ConfigError, err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants that `serde` alone cannot express.
    ///
    /// # Errors
    /// Returns an error if any listener address is unparsable or the
    /// general section is internally inconsistent.
    pub fn validate(&self) -> Result<(), Error> {
        if self.listeners.is_empty() {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "at least one listener is required",
            ));
        }
        for listener in &self.listeners {
            listener.address().to_socket_addrs().map_err(|err| {
                Error::new(
                    ErrorKind::ConfigError,
                    format!("invalid listener address {}: {err}", listener.address()),
                )
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_listener_list() {
        let config = Config {
            listeners: vec![],
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            [[listeners]]
            address = "127.0.0.1:1883"
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.listeners().len(), 1);
        assert_eq!(config.listeners()[0].address(), "127.0.0.1:1883");
    }
}
