// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dispatch loop: turn the current runlevel into set commands.

use std::sync::Arc;

use super::Bridge;
use crate::evaluator::evaluate;
use crate::protocol::{Transport, set_topic};

impl<T: Transport> Bridge<T> {
    /// Evaluates every device once and publishes the resulting commands.
    ///
    /// Returns the number of commands produced.
    pub async fn dispatch_once(&self) -> usize {
        // Two separate reads. A config or runlevel update landing in between
        // raises the trigger, so the next cycle sees a consistent pair.
        let devices = self.registry.snapshot();
        let runlevel = self.runlevel.current();
        let commands = evaluate(&devices, runlevel, self.settings.hysteresis);

        for command in &commands {
            let payload = match command.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(device = %command.device, error = %e, "Cannot encode command");
                    continue;
                }
            };

            if let Err(e) = self.transport.publish(set_topic(&command.device), payload).await {
                tracing::warn!(device = %command.device, error = %e, "Failed to publish command");
            }
        }

        tracing::debug!(
            runlevel,
            devices = devices.len(),
            commands = commands.len(),
            "Dispatch cycle complete"
        );
        commands.len()
    }

    /// Runs one dispatch cycle per trigger, for the lifetime of the process.
    ///
    /// Raises that arrive during a cycle collapse into one follow-up cycle.
    /// While disconnected a wake-up is skipped; connecting raises the
    /// trigger again.
    pub async fn run_dispatch_loop(self: Arc<Self>) {
        loop {
            self.dispatch.wait().await;
            if !self.connection.is_enabled() {
                tracing::debug!("Skipping dispatch while disconnected");
                continue;
            }
            self.dispatch_once().await;
        }
    }
}
