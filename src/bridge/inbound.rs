// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handlers for routed inbound messages.

use super::Bridge;
use crate::config::ServerConfig;
use crate::error::{ParseError, Result};
use crate::protocol::{Route, Transport, reading_topic};
use crate::runlevel::parse_runlevel;

impl<T: Transport> Bridge<T> {
    /// Routes one inbound message to its handler.
    ///
    /// Malformed payloads are logged and dropped; state keeps its last good value.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let Some(route) = self.router.route(topic) else {
            tracing::trace!(topic = %topic, "Ignoring unrouted topic");
            return;
        };

        let outcome = match route {
            Route::Config => self.apply_config(payload).map(drop),
            Route::Runlevel => self.apply_runlevel(payload),
            Route::RawReading { device_id } => {
                self.forward_reading(device_id, payload).await.map(drop)
            }
        };

        if let Err(e) = outcome {
            tracing::warn!(topic = %topic, error = %e, "Dropping inbound message");
        }
    }

    /// Replaces the registry from a `config/room` document.
    ///
    /// The document is persisted before the swap. A persistence failure is
    /// logged and the in-memory swap still happens.
    ///
    /// Returns the number of configured devices.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a valid configuration document.
    pub fn apply_config(&self, payload: &[u8]) -> Result<usize> {
        let document: serde_json::Value =
            serde_json::from_slice(payload).map_err(ParseError::Json)?;
        let config = ServerConfig::from_value(&document).map_err(ParseError::Json)?;
        if let Err(e) = config.validate_settings() {
            tracing::warn!(error = %e, "Configuration settings out of range, next start keeps current ones");
        }

        if let Err(e) = self.store.save(&document) {
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist configuration, keeping it in memory only"
            );
        }

        let devices = config.into_devices();
        let count = devices.len();
        self.registry.replace(devices);
        self.dispatch.raise();

        tracing::info!(devices = count, "Configuration updated");
        Ok(count)
    }

    /// Stores a `system/runlevel` value.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not an integer.
    pub fn apply_runlevel(&self, payload: &[u8]) -> Result<()> {
        let runlevel = parse_runlevel(payload)?;
        self.runlevel.set(runlevel);
        Ok(())
    }

    /// Republishes a raw reading under the name of the device it belongs to.
    ///
    /// Returns `false` if no registered device carries `device_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not JSON or the publish cannot be queued.
    pub async fn forward_reading(&self, device_id: &str, payload: &[u8]) -> Result<bool> {
        let reading: serde_json::Value =
            serde_json::from_slice(payload).map_err(ParseError::Json)?;

        let Some(device) = self.registry.find_by_id(device_id) else {
            tracing::trace!(id = %device_id, "Reading from unknown device");
            return Ok(false);
        };

        self.transport
            .publish(reading_topic(&device.name), reading.to_string())
            .await?;
        tracing::debug!(id = %device_id, device = %device.name, "Forwarded reading");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{BridgeSettings, ConfigStore};
    use crate::protocol::RecordingTransport;
    use crate::types::DeviceDescriptor;

    fn bridge(dir: &tempfile::TempDir, devices: Vec<DeviceDescriptor>) -> Bridge<RecordingTransport> {
        Bridge::new(
            BridgeSettings {
                update_interval: Duration::from_secs(10),
                hysteresis: 2,
            },
            devices,
            ConfigStore::new(dir.path().join("serverConfig.json")),
            RecordingTransport::new(),
        )
    }

    #[tokio::test]
    async fn config_message_replaces_registry_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, vec![DeviceDescriptor::new("old", "o", 1)]);

        let payload = br#"{"plugin":{"niko":{"devicelist":{
            "kitchen":{"id":"k-1","function_level":5},
            "hall":{"id":"h-1","function_level":2}}}}}"#;
        bridge.handle_message("config/room", payload).await;

        let names: Vec<_> = bridge.registry().snapshot().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, ["kitchen", "hall"]);
        assert!(dir.path().join("serverConfig.json").exists());
    }

    #[tokio::test]
    async fn malformed_config_keeps_registry() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, vec![DeviceDescriptor::new("old", "o", 1)]);

        bridge.handle_message("config/room", b"{not json").await;
        bridge.handle_message("config/room", br#"{"plugin":{}}"#).await;

        assert_eq!(bridge.registry().len(), 1);
        assert!(!dir.path().join("serverConfig.json").exists());
    }

    #[tokio::test]
    async fn persistence_failure_still_updates_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let bridge = Bridge::new(
            BridgeSettings {
                update_interval: Duration::from_secs(10),
                hysteresis: 2,
            },
            Vec::new(),
            ConfigStore::new(blocker.join("serverConfig.json")),
            RecordingTransport::new(),
        );

        let payload = br#"{"plugin":{"niko":{"devicelist":{"a":{"id":"1","function_level":1}}}}}"#;
        assert_eq!(bridge.apply_config(payload).unwrap(), 1);
        assert_eq!(bridge.registry().len(), 1);
    }

    #[tokio::test]
    async fn runlevel_message_updates_state() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, Vec::new());

        bridge.handle_message("system/runlevel", b"4").await;
        assert_eq!(bridge.runlevel(), 4);

        bridge.handle_message("system/runlevel", b"four").await;
        assert_eq!(bridge.runlevel(), 4);
    }

    #[tokio::test]
    async fn reading_is_republished_under_device_name() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, vec![DeviceDescriptor::new("kitchen", "0a1b", 5)]);

        bridge
            .handle_message("data/raw/socket/0a1b", br#"{"power": 12.5}"#)
            .await;

        let sent = bridge.transport().published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "data/room/socket/kitchen");
        assert_eq!(sent[0].payload, r#"{"power":12.5}"#);
    }

    #[tokio::test]
    async fn reading_from_unknown_device_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, vec![DeviceDescriptor::new("kitchen", "0a1b", 5)]);

        assert!(!bridge.forward_reading("ffff", br#"{"power": 1}"#).await.unwrap());
        assert!(bridge.transport().published().is_empty());
    }

    #[tokio::test]
    async fn malformed_reading_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, vec![DeviceDescriptor::new("kitchen", "0a1b", 5)]);

        bridge.handle_message("data/raw/socket/0a1b", b"not json").await;
        assert!(bridge.transport().published().is_empty());
    }

    #[tokio::test]
    async fn numeric_ids_match_topic_levels() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(&dir, vec![DeviceDescriptor::new("garage", 42_u64, 5)]);

        assert!(bridge.forward_reading("42", b"{}").await.unwrap());
        assert_eq!(bridge.transport().published()[0].topic, "data/room/socket/garage");
    }
}
