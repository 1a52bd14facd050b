// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration sources.
//!
//! Two JSON documents feed the bridge:
//!
//! - [`BootstrapConfig`]: local defaults (`default.conf`) with the broker
//!   address and credentials plus an initial update interval and hysteresis.
//! - [`ServerConfig`]: the document received on `config/room`, persisted by
//!   [`ConfigStore`] so a restart can resume without waiting for the broker.
//!
//! [`BridgeSettings::resolve`] merges both into the values used for the
//! lifetime of the process.

mod store;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::DEFAULT_PORT;
use crate::types::{DeviceDescriptor, DeviceId};

pub use store::ConfigStore;

/// Default location of the bootstrap file.
pub const DEFAULT_BOOTSTRAP_PATH: &str = "default.conf";

/// Default location of the persisted server configuration.
pub const DEFAULT_STATE_PATH: &str = "serverConfig.json";

/// Environment variable overriding [`DEFAULT_BOOTSTRAP_PATH`].
pub const BOOTSTRAP_PATH_ENV: &str = "NIKO_BRIDGE_CONFIG";

/// Environment variable overriding [`DEFAULT_STATE_PATH`].
pub const STATE_PATH_ENV: &str = "NIKO_BRIDGE_STATE";

/// File locations used by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// Bootstrap defaults.
    pub bootstrap: PathBuf,
    /// Persisted server configuration.
    pub state: PathBuf,
}

impl ConfigPaths {
    /// Resolves the paths from the environment, falling back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bootstrap: lookup(BOOTSTRAP_PATH_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_BOOTSTRAP_PATH), PathBuf::from),
            state: lookup(STATE_PATH_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_STATE_PATH), PathBuf::from),
        }
    }
}

/// Local bootstrap defaults.
///
/// # Examples
///
/// ```
/// use niko_bridge::config::BootstrapConfig;
///
/// let json = r#"{
///     "mqtt_server": "broker.local",
///     "mqtt_user": "niko",
///     "mqtt_pass": "secret",
///     "device_update_interval": 30,
///     "hysteresis": 1
/// }"#;
/// let config = BootstrapConfig::from_json(json).unwrap();
/// assert_eq!(config.mqtt_port, 8883);
/// assert!(config.mqtt_tls);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Broker host name or address.
    pub mqtt_server: String,
    /// Broker user name. Empty means anonymous.
    #[serde(default)]
    pub mqtt_user: String,
    /// Broker password.
    #[serde(default)]
    pub mqtt_pass: String,
    /// Broker port.
    #[serde(default = "default_port")]
    pub mqtt_port: u16,
    /// Whether to connect over TLS.
    #[serde(default = "default_tls")]
    pub mqtt_tls: bool,
    /// MQTT keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long to wait for the broker to acknowledge the connection.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    /// Seconds between two rounds of reading requests.
    pub device_update_interval: f64,
    /// Width of the switching dead-band.
    pub hysteresis: i64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_tls() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    30
}

fn default_connection_timeout() -> u64 {
    10
}

impl BootstrapConfig {
    /// Loads and validates the bootstrap file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is malformed, or holds
    /// out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded bootstrap configuration");
        Ok(config)
    }

    /// Parses and validates a bootstrap document.
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or holds out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Malformed {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the broker credentials, if a user name is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.mqtt_user.is_empty() {
            None
        } else {
            Some((&self.mqtt_user, &self.mqtt_pass))
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt_server.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt_server must not be empty".to_string(),
            ));
        }
        if self.mqtt_port == 0 {
            return Err(ConfigError::Validation("mqtt_port must be non-zero".to_string()));
        }
        interval_from_secs(self.device_update_interval)?;
        hysteresis_checked(self.hysteresis)?;
        Ok(())
    }
}

/// The broker-sourced configuration document.
///
/// Only the `plugin.niko` section is interpreted; everything else is
/// ignored here and kept verbatim by [`ConfigStore`].
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Plugin sections.
    pub plugin: PluginSection,
}

/// The `plugin` object of a [`ServerConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSection {
    /// Settings for this bridge.
    pub niko: NikoSection,
}

/// The `plugin.niko` object of a [`ServerConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct NikoSection {
    /// Seconds between two rounds of reading requests.
    #[serde(default)]
    pub device_update_interval: Option<f64>,
    /// Width of the switching dead-band.
    #[serde(default)]
    pub hysteresis: Option<i64>,
    /// Configured sockets, in document order.
    #[serde(deserialize_with = "ordered_devices")]
    pub devicelist: Vec<DeviceDescriptor>,
}

impl ServerConfig {
    /// Interprets an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns error if the `plugin.niko.devicelist` section is missing or malformed.
    pub fn from_value(document: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(document)
    }

    /// Returns the configured devices.
    #[must_use]
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.plugin.niko.devicelist
    }

    /// Checks the interval and hysteresis carried by the document, if any.
    ///
    /// # Errors
    ///
    /// Returns error if a present value is out of range.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.plugin.niko.device_update_interval {
            interval_from_secs(secs)?;
        }
        if let Some(hysteresis) = self.plugin.niko.hysteresis {
            hysteresis_checked(hysteresis)?;
        }
        Ok(())
    }

    /// Consumes the document and returns its devices.
    #[must_use]
    pub fn into_devices(self) -> Vec<DeviceDescriptor> {
        self.plugin.niko.devicelist
    }
}

/// One entry of the `devicelist` object.
#[derive(Debug, Deserialize)]
struct DeviceEntry {
    id: DeviceId,
    #[serde(deserialize_with = "integer_or_numeric_string")]
    function_level: i64,
}

fn ordered_devices<'de, D>(deserializer: D) -> Result<Vec<DeviceDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    entries
        .into_iter()
        .map(|(name, value)| {
            let entry = DeviceEntry::deserialize(value)
                .map_err(|e| de::Error::custom(format!("device {name:?}: {e}")))?;
            Ok(DeviceDescriptor {
                name,
                id: entry.id,
                activation_threshold: entry.function_level,
            })
        })
        .collect()
}

fn integer_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Level {
        Integer(i64),
        Float(f64),
        Text(String),
    }

    match Level::deserialize(deserializer)? {
        Level::Integer(value) => Ok(value),
        Level::Float(value) => integral(value)
            .ok_or_else(|| de::Error::custom(format!("function_level {value} is not an integer"))),
        Level::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("function_level {text:?} is not an integer"))),
    }
}

/// Returns `value` as an `i64` if it has no fractional part and fits.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

/// Values fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Delay between two rounds of reading requests.
    pub update_interval: Duration,
    /// Width of the switching dead-band.
    pub hysteresis: i64,
}

impl BridgeSettings {
    /// Merges the bootstrap file with the persisted server configuration.
    ///
    /// Values present in `persisted` win; missing or out-of-range ones fall
    /// back to `bootstrap` with a warning, so a bad document received from
    /// the broker never prevents a restart. The returned device list is
    /// empty without a persisted configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the bootstrap interval or hysteresis is out of range.
    pub fn resolve(
        bootstrap: &BootstrapConfig,
        persisted: Option<ServerConfig>,
    ) -> Result<(Self, Vec<DeviceDescriptor>), ConfigError> {
        let fallback = Self {
            update_interval: interval_from_secs(bootstrap.device_update_interval)?,
            hysteresis: hysteresis_checked(bootstrap.hysteresis)?,
        };
        let Some(persisted) = persisted else {
            return Ok((fallback, Vec::new()));
        };

        let niko = persisted.plugin.niko;
        let update_interval = niko
            .device_update_interval
            .map_or(Ok(fallback.update_interval), interval_from_secs)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring persisted update interval");
                fallback.update_interval
            });
        let hysteresis = niko
            .hysteresis
            .map_or(Ok(fallback.hysteresis), hysteresis_checked)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring persisted hysteresis");
                fallback.hysteresis
            });

        let settings = Self {
            update_interval,
            hysteresis,
        };
        Ok((settings, niko.devicelist))
    }
}

impl fmt::Display for BridgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interval={:?} hysteresis={}",
            self.update_interval, self.hysteresis
        )
    }
}

fn interval_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(ConfigError::Validation(format!(
            "device_update_interval must be a positive number of seconds, got {secs}"
        ))),
    }
}

fn hysteresis_checked(hysteresis: i64) -> Result<i64, ConfigError> {
    if hysteresis < 0 {
        return Err(ConfigError::Validation(format!(
            "hysteresis must be >= 0, got {hysteresis}"
        )));
    }
    Ok(hysteresis)
}
