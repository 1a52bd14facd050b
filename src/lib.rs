// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `niko_bridge` - switch Niko smart sockets from a broadcast runlevel.
//!
//! The bridge listens on an MQTT broker for three kinds of messages:
//!
//! - `config/room`: the full list of sockets with their activation thresholds
//! - `system/runlevel`: a single integer describing the current demand
//! - `data/raw/socket/<id>`: raw readings from a socket
//!
//! Whenever the runlevel (or the configuration) changes, every socket is
//! compared against the runlevel with a hysteresis dead-band and switched
//! with a `room/socket/<name>/set` command. Raw readings are republished
//! under the socket's configured name, and readings are requested
//! periodically while connected.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use niko_bridge::config::{BootstrapConfig, BridgeSettings, ConfigStore};
//! use niko_bridge::protocol::MqttTransport;
//! use niko_bridge::Bridge;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> niko_bridge::Result<()> {
//!     let bootstrap = BootstrapConfig::load("default.conf".as_ref())?;
//!     let store = ConfigStore::new("serverConfig.json");
//!     let (settings, devices) = BridgeSettings::resolve(&bootstrap, store.load()?)?;
//!
//!     let (events_tx, events_rx) = mpsc::unbounded_channel();
//!     let transport = MqttTransport::builder()
//!         .host(&bootstrap.mqtt_server)
//!         .credentials(&bootstrap.mqtt_user, &bootstrap.mqtt_pass)
//!         .connect(events_tx)
//!         .await?;
//!
//!     let bridge = Arc::new(Bridge::new(settings, devices, store, transport));
//!     tokio::spawn(Arc::clone(&bridge).run_dispatch_loop());
//!     tokio::spawn(Arc::clone(&bridge).run_poll_loop());
//!     bridge.run(events_rx).await;
//!     Ok(())
//! }
//! ```

mod bridge;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod protocol;
pub mod registry;
pub mod runlevel;
pub mod trigger;
pub mod types;

pub use bridge::Bridge;
pub use config::{BootstrapConfig, BridgeSettings, ConfigStore, ServerConfig};
pub use error::{ConfigError, Error, ParseError, ProtocolError, Result};
pub use protocol::{MqttTransport, MqttTransportBuilder, TopicRouter, Transport, TransportEvent};
pub use types::{DeviceCommand, DeviceDescriptor, DeviceId, PowerState};
