// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the registry, the evaluator and the transport.
//!
//! # Types
//!
//! - [`PowerState`] - Desired ON/OFF state of a socket
//! - [`DeviceId`] - Opaque external identifier of a socket
//! - [`DeviceDescriptor`] - Registry record for one socket
//! - [`DeviceCommand`] - A switch command produced by the evaluator

mod device;
mod power;

pub use device::{DeviceCommand, DeviceDescriptor, DeviceId};
pub use power::PowerState;
