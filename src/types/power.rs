// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state of a smart socket.

use std::fmt;

use serde::Serialize;

/// Desired power state of a socket.
///
/// # Examples
///
/// ```
/// use niko_bridge::types::PowerState;
///
/// assert_eq!(PowerState::On.as_str(), "ON");
/// assert_eq!(PowerState::Off.as_str(), "OFF");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PowerState {
    /// Socket is switched off.
    #[serde(rename = "OFF")]
    Off,
    /// Socket is switched on.
    #[serde(rename = "ON")]
    On,
}

impl PowerState {
    /// Returns the wire representation used in set commands.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
