// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device descriptors and the commands produced for them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PowerState;

/// Opaque external identifier of a socket.
///
/// The broker-side configuration may carry identifiers either as JSON
/// strings or as JSON numbers. The original representation is kept so
/// that set commands echo the identifier back exactly as it was received.
///
/// # Examples
///
/// ```
/// use niko_bridge::types::DeviceId;
///
/// let id: DeviceId = serde_json::from_str("42").unwrap();
/// assert!(id.matches("42"));
/// assert_eq!(serde_json::to_string(&id).unwrap(), "42");
///
/// let id = DeviceId::from("a1b2");
/// assert!(id.matches("a1b2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    /// Identifier received as a JSON string.
    Text(String),
    /// Identifier received as a JSON number.
    Number(serde_json::Number),
}

impl DeviceId {
    /// Returns `true` if this identifier equals the raw topic segment.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Self::Text(text) => text == raw,
            Self::Number(number) => number.to_string() == raw,
        }
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for DeviceId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// Registry record for one controllable socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Human-assigned name, unique within the registry.
    pub name: String,
    /// External identifier used in outbound commands.
    pub id: DeviceId,
    /// Threshold compared against the runlevel.
    pub activation_threshold: i64,
}

impl DeviceDescriptor {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<DeviceId>, activation_threshold: i64) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            activation_threshold,
        }
    }
}

/// A switch command for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    /// Registry name of the target device.
    pub device: String,
    /// External identifier of the target device.
    pub id: DeviceId,
    /// Desired state.
    pub state: PowerState,
}

#[derive(Serialize)]
struct SetPayload<'a> {
    id: &'a DeviceId,
    state: PowerState,
}

impl DeviceCommand {
    /// Creates a command targeting `device`.
    #[must_use]
    pub fn new(device: &DeviceDescriptor, state: PowerState) -> Self {
        Self {
            device: device.name.clone(),
            id: device.id.clone(),
            state,
        }
    }

    /// Encodes the `{"id": …, "state": "ON"|"OFF"}` set payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SetPayload {
            id: &self.id,
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_from_json_string() {
        let id: DeviceId = serde_json::from_str(r#""socket-7""#).unwrap();
        assert_eq!(id, DeviceId::Text("socket-7".to_string()));
        assert!(id.matches("socket-7"));
        assert!(!id.matches("socket-8"));
    }

    #[test]
    fn device_id_from_json_number() {
        let id: DeviceId = serde_json::from_str("1234").unwrap();
        assert!(matches!(id, DeviceId::Number(_)));
        assert!(id.matches("1234"));
        assert_eq!(id.to_string(), "1234");
    }

    #[test]
    fn set_payload_keeps_string_id() {
        let device = DeviceDescriptor::new("kitchen", "abc", 5);
        let command = DeviceCommand::new(&device, PowerState::On);
        assert_eq!(
            command.to_payload().unwrap(),
            r#"{"id":"abc","state":"ON"}"#
        );
    }

    #[test]
    fn set_payload_keeps_numeric_id() {
        let device = DeviceDescriptor::new("hall", 17_u64, 2);
        let command = DeviceCommand::new(&device, PowerState::Off);
        assert_eq!(command.to_payload().unwrap(), r#"{"id":17,"state":"OFF"}"#);
    }
}
