// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! Errors are split by where they originate: the broker connection,
//! inbound payload decoding, and configuration loading or persistence.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while talking to the MQTT broker.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while decoding an inbound payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while loading or persisting configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to the MQTT transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The MQTT client rejected a request.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors raised while decoding inbound messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// The runlevel payload is not an integer.
    #[error("invalid runlevel: {0:?}")]
    InvalidRunlevel(String),
}

/// Errors related to configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing a configuration file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for its schema.
    #[error("malformed configuration in {path}: {source}")]
    Malformed {
        /// The file involved.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError::InvalidRunlevel("high".to_string());
        assert_eq!(err.to_string(), "invalid runlevel: \"high\"");
    }

    #[test]
    fn error_from_config_error() {
        let err: Error = ConfigError::Validation("hysteresis must be >= 0".to_string()).into();
        assert!(matches!(err, Error::Config(ConfigError::Validation(_))));
        assert_eq!(
            err.to_string(),
            "config error: invalid configuration: hysteresis must be >= 0"
        );
    }

    #[test]
    fn io_error_mentions_path() {
        let err = ConfigError::Io {
            path: PathBuf::from("serverConfig.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("serverConfig.json"));
    }
}
