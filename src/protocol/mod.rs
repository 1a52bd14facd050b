// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport boundary between the bridge and the message broker.
//!
//! The bridge only needs a narrow surface from its transport:
//!
//! - outbound: [`Transport::subscribe`] and [`Transport::publish`]
//! - inbound: a stream of [`TransportEvent`]s (connected, disconnected,
//!   message)
//!
//! [`MqttTransport`] implements this over `rumqttc`; [`RecordingTransport`]
//! is an in-memory implementation that records every request.

mod mqtt_transport;
mod recording;
mod topic_router;

use std::future::Future;

pub use mqtt_transport::{DEFAULT_PORT, MqttTransport, MqttTransportBuilder};
pub use recording::{Published, RecordingTransport};
pub use topic_router::{
    CONFIG_TOPIC, GET_PAYLOAD, RAW_READING_FILTER, RUNLEVEL_TOPIC, Route, RouteKind, TopicRouter,
    filter_matches, get_topic, reading_topic, set_topic,
};

use crate::error::ProtocolError;

/// Event delivered by a transport to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    Connected,
    /// The connection was lost or closed.
    Disconnected,
    /// A message arrived on a subscribed topic.
    Message {
        /// Full topic name.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

impl TransportEvent {
    /// Creates a message event.
    #[must_use]
    pub fn message(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::Message {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound side of a broker connection.
///
/// Publishing is fire-and-forget: an `Ok` means the request was handed to
/// the client, not that the broker acknowledged it.
pub trait Transport: Send + Sync + 'static {
    /// Subscribes to a topic filter.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be queued.
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be queued.
    fn publish(
        &self,
        topic: String,
        payload: String,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}
