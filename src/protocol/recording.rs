// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory transport that records every request.

use std::future::{Future, ready};

use parking_lot::Mutex;

use super::Transport;
use crate::error::ProtocolError;

/// A message handed to [`RecordingTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic name.
    pub topic: String,
    /// Payload.
    pub payload: String,
}

/// Transport that keeps subscriptions and publishes in memory.
///
/// Useful to drive a [`Bridge`](crate::Bridge) without a broker.
///
/// # Examples
///
/// ```
/// use niko_bridge::protocol::{RecordingTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = RecordingTransport::new();
/// transport.publish("a/b".to_string(), "x".to_string()).await.unwrap();
/// assert_eq!(transport.published()[0].topic, "a/b");
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RecordingTransport {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<Published>>,
}

impl RecordingTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the filters subscribed so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    /// Returns the messages published so far.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// Returns and clears the messages published so far.
    pub fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.lock())
    }
}

impl Transport for RecordingTransport {
    fn subscribe(&self, filter: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        self.subscriptions.lock().push(filter.to_string());
        ready(Ok(()))
    }

    fn publish(
        &self,
        topic: String,
        payload: String,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        tracing::trace!(topic = %topic, payload = %payload, "Recording publish");
        self.published.lock().push(Published { topic, payload });
        ready(Ok(()))
    }
}
