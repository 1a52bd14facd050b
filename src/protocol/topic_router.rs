// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT topic routing for inbound messages and outbound topic names.
//!
//! The [`TopicRouter`] owns the table of topic filters the bridge listens
//! to. The same table drives both the broker subscriptions and the
//! classification of each inbound message.
//!
//! # Architecture
//!
//! ```text
//! MQTT Message: data/raw/socket/0a1b2c → {"power": 12.5}
//!                     ↓
//!             TopicRouter.route()
//!                     ↓
//!      Route::RawReading { device_id: "0a1b2c" }
//!                     ↓
//!        Registry lookup by device id → "kitchen"
//!                     ↓
//!     publish data/room/socket/kitchen → {"power":12.5}
//! ```

/// Inbound full device-list configuration.
pub const CONFIG_TOPIC: &str = "config/room";

/// Inbound runlevel signal.
pub const RUNLEVEL_TOPIC: &str = "system/runlevel";

/// Inbound raw socket readings, one level per device id.
pub const RAW_READING_FILTER: &str = "data/raw/socket/#";

/// Payload of a reading request.
pub const GET_PAYLOAD: &str = "GET";

/// Kind of handler an inbound topic maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Device list configuration.
    Config,
    /// Runlevel signal.
    Runlevel,
    /// Raw reading tagged with a device id.
    RawReading,
}

/// A classified inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `config/room`.
    Config,
    /// `system/runlevel`.
    Runlevel,
    /// `data/raw/socket/<device_id>`.
    RawReading {
        /// The last topic level.
        device_id: &'a str,
    },
}

#[derive(Debug, Clone)]
struct RouteEntry {
    filter: &'static str,
    kind: RouteKind,
}

/// Routing table from topic filters to handlers.
///
/// Entries are tried in insertion order; the first matching filter wins.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    entries: Vec<RouteEntry>,
}

impl TopicRouter {
    /// Creates a router with the bridge's standard table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: vec![
                RouteEntry {
                    filter: CONFIG_TOPIC,
                    kind: RouteKind::Config,
                },
                RouteEntry {
                    filter: RUNLEVEL_TOPIC,
                    kind: RouteKind::Runlevel,
                },
                RouteEntry {
                    filter: RAW_READING_FILTER,
                    kind: RouteKind::RawReading,
                },
            ],
        }
    }

    /// Returns the filters to subscribe to.
    pub fn subscriptions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.filter)
    }

    /// Classifies an inbound topic.
    ///
    /// Returns `None` if no filter matches, or if a raw reading topic has
    /// no device id level.
    #[must_use]
    pub fn route<'a>(&self, topic: &'a str) -> Option<Route<'a>> {
        let entry = self
            .entries
            .iter()
            .find(|entry| filter_matches(entry.filter, topic))?;

        match entry.kind {
            RouteKind::Config => Some(Route::Config),
            RouteKind::Runlevel => Some(Route::Runlevel),
            RouteKind::RawReading => {
                // `#` also matches the parent level, which carries no id.
                let levels = topic.strip_prefix(entry.filter.trim_end_matches('#'))?;
                let device_id = levels.rsplit('/').next().filter(|id| !id.is_empty())?;
                Some(Route::RawReading { device_id })
            }
        }
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Republished reading for a named device.
#[must_use]
pub fn reading_topic(device_name: &str) -> String {
    format!("data/room/socket/{device_name}")
}

/// Reading request for a named device.
#[must_use]
pub fn get_topic(device_name: &str) -> String {
    format!("data/room/socket/{device_name}/get")
}

/// Set command for a named device.
#[must_use]
pub fn set_topic(device_name: &str) -> String {
    format!("room/socket/{device_name}/set")
}

/// Matches an MQTT topic against a filter with `+` and `#` wildcards.
#[must_use]
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
