// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runlevel to socket state mapping.
//!
//! For each device, with `t` its activation threshold, `r` the runlevel and
//! `h` the hysteresis:
//!
//! ```text
//! t >= r + h      → ON
//! t <= r          → OFF
//! r < t < r + h   → no command (dead-band)
//! ```
//!
//! The ON check runs first, so with `h == 0` a device at `t == r` is ON.

use crate::types::{DeviceCommand, DeviceDescriptor, PowerState};

/// Returns the desired state for a single threshold, or `None` inside the dead-band.
#[must_use]
pub fn desired_state(activation_threshold: i64, runlevel: i64, hysteresis: i64) -> Option<PowerState> {
    if activation_threshold >= runlevel.saturating_add(hysteresis) {
        Some(PowerState::On)
    } else if activation_threshold <= runlevel {
        Some(PowerState::Off)
    } else {
        None
    }
}

/// Computes the commands for every device that is outside the dead-band.
///
/// Commands come out in registry order. The function is pure; calling it
/// twice with the same inputs yields the same commands.
///
/// # Examples
///
/// ```
/// use niko_bridge::evaluator::evaluate;
/// use niko_bridge::types::{DeviceDescriptor, PowerState};
///
/// let devices = [DeviceDescriptor::new("kitchen", "k1", 5)];
///
/// let commands = evaluate(&devices, 3, 2);
/// assert_eq!(commands[0].state, PowerState::On);
///
/// assert!(evaluate(&devices, 4, 2).is_empty());
/// ```
#[must_use]
pub fn evaluate(devices: &[DeviceDescriptor], runlevel: i64, hysteresis: i64) -> Vec<DeviceCommand> {
    devices
        .iter()
        .filter_map(|device| {
            desired_state(device.activation_threshold, runlevel, hysteresis)
                .map(|state| DeviceCommand::new(device, state))
        })
        .collect()
}
