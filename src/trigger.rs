// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wake-up primitives for the background loops.
//!
//! - [`DispatchTrigger`] is edge-style and coalescing: any number of raises
//!   while nobody is waiting collapse into a single pending wake-up.
//! - [`ConnectionGate`] is level-style: it stays open until explicitly closed.

use tokio::sync::{Notify, watch};

/// Coalescing wake-up signal for the dispatch loop.
///
/// # Examples
///
/// ```
/// use niko_bridge::trigger::DispatchTrigger;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let trigger = DispatchTrigger::new();
/// trigger.raise();
/// trigger.raise();
/// // Both raises are consumed by a single wait.
/// trigger.wait().await;
/// # }
/// ```
#[derive(Debug, Default)]
pub struct DispatchTrigger {
    notify: Notify,
}

impl DispatchTrigger {
    /// Creates a trigger with no pending wake-up.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the trigger. Has no further effect if a wake-up is already pending.
    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Waits until the trigger is raised and clears it.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Level-triggered gate opened while the broker connection is up.
#[derive(Debug)]
pub struct ConnectionGate {
    state: watch::Sender<bool>,
}

impl ConnectionGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state }
    }

    /// Opens the gate.
    pub fn enable(&self) {
        self.state.send_replace(true);
    }

    /// Closes the gate.
    pub fn disable(&self) {
        self.state.send_replace(false);
    }

    /// Returns whether the gate is open.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.state.borrow()
    }

    /// Waits until the gate is open. Returns immediately if it already is.
    pub async fn wait_enabled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|enabled| *enabled).await;
    }
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn raised_trigger_wakes_waiter() {
        let trigger = DispatchTrigger::new();
        trigger.raise();
        assert!(timeout(Duration::from_millis(50), trigger.wait()).await.is_ok());
    }

    #[tokio::test]
    async fn idle_trigger_blocks() {
        let trigger = DispatchTrigger::new();
        assert!(timeout(Duration::from_millis(50), trigger.wait()).await.is_err());
    }

    #[tokio::test]
    async fn repeated_raises_coalesce_into_one_wake_up() {
        let trigger = DispatchTrigger::new();
        for _ in 0..10 {
            trigger.raise();
        }
        assert!(timeout(Duration::from_millis(50), trigger.wait()).await.is_ok());
        assert!(timeout(Duration::from_millis(50), trigger.wait()).await.is_err());
    }

    #[tokio::test]
    async fn gate_starts_closed() {
        let gate = ConnectionGate::new();
        assert!(!gate.is_enabled());
        assert!(timeout(Duration::from_millis(50), gate.wait_enabled()).await.is_err());
    }

    #[tokio::test]
    async fn gate_opens_and_closes() {
        let gate = ConnectionGate::new();
        gate.enable();
        assert!(gate.is_enabled());
        assert!(timeout(Duration::from_millis(50), gate.wait_enabled()).await.is_ok());

        gate.disable();
        assert!(!gate.is_enabled());
    }

    #[tokio::test]
    async fn gate_wakes_blocked_waiter() {
        let gate = std::sync::Arc::new(ConnectionGate::new());
        let waiter = {
            let gate = std::sync::Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_enabled().await })
        };

        tokio::task::yield_now().await;
        gate.enable();
        assert!(timeout(Duration::from_millis(100), waiter).await.is_ok());
    }
}
