// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge core.
//!
//! A [`Bridge`] owns all shared state (registry, runlevel, wake-up
//! primitives) and is handed to each task as an `Arc`. Three tasks run
//! against it:
//!
//! - [`Bridge::run`] consumes [`TransportEvent`]s and mutates state
//! - [`Bridge::run_dispatch_loop`] switches sockets whenever triggered
//! - [`Bridge::run_poll_loop`] requests fresh readings while connected
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use niko_bridge::config::{BridgeSettings, ConfigStore};
//! use niko_bridge::protocol::{RecordingTransport, TransportEvent};
//! use niko_bridge::types::DeviceDescriptor;
//! use niko_bridge::Bridge;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let settings = BridgeSettings {
//!     update_interval: Duration::from_secs(30),
//!     hysteresis: 2,
//! };
//! let bridge = Arc::new(Bridge::new(
//!     settings,
//!     vec![DeviceDescriptor::new("kitchen", "k-1", 5)],
//!     ConfigStore::new(std::env::temp_dir().join("niko-doc-state.json")),
//!     RecordingTransport::new(),
//! ));
//!
//! bridge.handle_event(TransportEvent::Connected).await;
//! bridge.handle_event(TransportEvent::message("system/runlevel", "3")).await;
//! assert_eq!(bridge.dispatch_once().await, 1);
//!
//! let sent = bridge.transport().published();
//! assert_eq!(sent[0].topic, "room/socket/kitchen/set");
//! assert_eq!(sent[0].payload, r#"{"id":"k-1","state":"ON"}"#);
//! # }
//! ```

mod dispatch;
mod inbound;
mod poll;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{BridgeSettings, ConfigStore};
use crate::protocol::{TopicRouter, Transport, TransportEvent};
use crate::registry::DeviceRegistry;
use crate::runlevel::RunlevelState;
use crate::trigger::{ConnectionGate, DispatchTrigger};
use crate::types::DeviceDescriptor;

/// Shared state and behavior of the bridge.
#[derive(Debug)]
pub struct Bridge<T> {
    registry: DeviceRegistry,
    runlevel: RunlevelState,
    dispatch: Arc<DispatchTrigger>,
    connection: ConnectionGate,
    settings: BridgeSettings,
    router: TopicRouter,
    store: ConfigStore,
    transport: T,
}

impl<T: Transport> Bridge<T> {
    /// Creates a bridge seeded with `devices`, initially disconnected.
    #[must_use]
    pub fn new(
        settings: BridgeSettings,
        devices: Vec<DeviceDescriptor>,
        store: ConfigStore,
        transport: T,
    ) -> Self {
        let dispatch = Arc::new(DispatchTrigger::new());
        Self {
            registry: DeviceRegistry::new(devices),
            runlevel: RunlevelState::new(Arc::clone(&dispatch)),
            dispatch,
            connection: ConnectionGate::new(),
            settings,
            router: TopicRouter::new(),
            store,
            transport,
        }
    }

    /// Returns the device registry.
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Returns the latest runlevel.
    #[must_use]
    pub fn runlevel(&self) -> i64 {
        self.runlevel.current()
    }

    /// Returns the settings fixed at startup.
    #[must_use]
    pub fn settings(&self) -> BridgeSettings {
        self.settings
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns whether the transport reported a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_enabled()
    }

    /// Requests a re-evaluation of every device.
    pub fn request_dispatch(&self) {
        self.dispatch.raise();
    }

    /// Consumes transport events until the channel closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::debug!("Transport event stream closed");
    }

    /// Handles a single transport event.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Message { topic, payload } => {
                self.handle_message(&topic, &payload).await;
            }
        }
    }

    /// Subscribes to every routed topic, resumes polling and forces a dispatch.
    pub async fn on_connected(&self) {
        for filter in self.router.subscriptions() {
            if let Err(e) = self.transport.subscribe(filter).await {
                tracing::error!(filter = %filter, error = %e, "Subscription failed");
            }
        }
        self.connection.enable();
        self.dispatch.raise();
        tracing::info!(devices = self.registry.len(), "Bridge online");
    }

    /// Stops polling until the next connection.
    pub fn on_disconnected(&self) {
        self.connection.disable();
        tracing::info!("Bridge offline");
    }
}
