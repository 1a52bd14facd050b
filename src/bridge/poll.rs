// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Poll loop: periodically ask every socket for a fresh reading.

use std::sync::Arc;

use super::Bridge;
use crate::protocol::{GET_PAYLOAD, Transport, get_topic};

impl<T: Transport> Bridge<T> {
    /// Publishes one reading request per registered device.
    ///
    /// Returns the number of requests published.
    pub async fn poll_once(&self) -> usize {
        let devices = self.registry.snapshot();
        let mut sent = 0;

        for device in devices.iter() {
            match self
                .transport
                .publish(get_topic(&device.name), GET_PAYLOAD.to_string())
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(device = %device.name, error = %e, "Failed to request reading");
                }
            }
        }

        tracing::trace!(requests = sent, "Poll round complete");
        sent
    }

    /// Requests readings every update interval while connected, for the
    /// lifetime of the process.
    pub async fn run_poll_loop(self: Arc<Self>) {
        loop {
            self.connection.wait_enabled().await;
            tokio::time::sleep(self.settings.update_interval).await;

            // The connection may have dropped during the sleep.
            if !self.connection.is_enabled() {
                continue;
            }
            self.poll_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{BridgeSettings, ConfigStore};
    use crate::protocol::RecordingTransport;
    use crate::types::DeviceDescriptor;

    fn bridge(devices: Vec<DeviceDescriptor>) -> Arc<Bridge<RecordingTransport>> {
        Arc::new(Bridge::new(
            BridgeSettings {
                update_interval: Duration::from_secs(10),
                hysteresis: 1,
            },
            devices,
            ConfigStore::new(std::env::temp_dir().join("niko-poll-test.json")),
            RecordingTransport::new(),
        ))
    }

    #[tokio::test]
    async fn poll_requests_every_device() {
        let bridge = bridge(vec![
            DeviceDescriptor::new("kitchen", "k-1", 5),
            DeviceDescriptor::new("hall", "h-1", 2),
        ]);

        assert_eq!(bridge.poll_once().await, 2);

        let sent = bridge.transport().published();
        assert_eq!(sent[0].topic, "data/room/socket/kitchen/get");
        assert_eq!(sent[0].payload, "GET");
        assert_eq!(sent[1].topic, "data/room/socket/hall/get");
    }

    #[tokio::test(start_paused = true)]
    async fn loop_idles_while_disconnected() {
        let bridge = bridge(vec![DeviceDescriptor::new("kitchen", "k-1", 5)]);
        let task = tokio::spawn(Arc::clone(&bridge).run_poll_loop());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(bridge.transport().published().is_empty());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_each_interval_while_connected() {
        let bridge = bridge(vec![DeviceDescriptor::new("kitchen", "k-1", 5)]);
        bridge.connection.enable();
        let task = tokio::spawn(Arc::clone(&bridge).run_poll_loop());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(bridge.transport().published().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bridge.transport().published().len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bridge.transport().published().len(), 2);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_sleep_skips_round() {
        let bridge = bridge(vec![DeviceDescriptor::new("kitchen", "k-1", 5)]);
        bridge.connection.enable();
        let task = tokio::spawn(Arc::clone(&bridge).run_poll_loop());

        tokio::time::sleep(Duration::from_secs(5)).await;
        bridge.on_disconnected();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(bridge.transport().published().is_empty());
        task.abort();
    }
}
