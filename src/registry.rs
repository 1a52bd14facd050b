// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory registry of configured sockets.
//!
//! The registry holds an immutable, reference-counted device list behind a
//! lock. [`DeviceRegistry::replace`] swaps the whole list in one step and
//! [`DeviceRegistry::snapshot`] hands out a clone of the current `Arc`, so
//! a reader always iterates either the old or the new list, never a mix.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::DeviceDescriptor;

/// Registry of configured devices, in configuration order.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: RwLock<Arc<[DeviceDescriptor]>>,
}

impl DeviceRegistry {
    /// Creates a registry seeded with `devices`.
    #[must_use]
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        warn_duplicate_ids(&devices);
        Self {
            devices: RwLock::new(devices.into()),
        }
    }

    /// Atomically replaces the whole device set.
    pub fn replace(&self, devices: Vec<DeviceDescriptor>) {
        warn_duplicate_ids(&devices);
        let devices: Arc<[DeviceDescriptor]> = devices.into();
        tracing::debug!(count = devices.len(), "Replacing device registry");
        *self.devices.write() = devices;
    }

    /// Returns a consistent view of the current device set.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[DeviceDescriptor]> {
        Arc::clone(&*self.devices.read())
    }

    /// Returns the first device whose identifier matches `raw_id`.
    #[must_use]
    pub fn find_by_id(&self, raw_id: &str) -> Option<DeviceDescriptor> {
        self.snapshot()
            .iter()
            .find(|device| device.id.matches(raw_id))
            .cloned()
    }

    /// Returns the number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Returns `true` if no devices are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Logs identifiers shared by several devices; the first one wins routing.
fn warn_duplicate_ids(devices: &[DeviceDescriptor]) {
    for (index, device) in devices.iter().enumerate() {
        if let Some(first) = devices[..index].iter().find(|d| d.id == device.id) {
            tracing::warn!(
                id = %device.id,
                device = %device.name,
                first = %first.name,
                "Duplicate device id, readings route to the first device"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn device(name: &str, id: &str, threshold: i64) -> DeviceDescriptor {
        DeviceDescriptor::new(name, id, threshold)
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = DeviceRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn replace_swaps_whole_set() {
        let registry = DeviceRegistry::new(vec![device("a", "1", 1), device("b", "2", 2)]);
        registry.replace(vec![device("c", "3", 3)]);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "c");
        assert!(registry.find_by_id("1").is_none());
    }

    #[test]
    fn snapshot_survives_replace() {
        let registry = DeviceRegistry::new(vec![device("a", "1", 1)]);
        let before = registry.snapshot();
        registry.replace(Vec::new());

        assert_eq!(before.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_keeps_configuration_order() {
        let registry = DeviceRegistry::new(vec![
            device("zeta", "1", 1),
            device("alpha", "2", 2),
            device("mid", "3", 3),
        ]);
        let names: Vec<_> = registry.snapshot().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn find_by_id_first_match_wins() {
        let registry = DeviceRegistry::new(vec![
            device("first", "dup", 1),
            device("second", "dup", 2),
        ]);
        let found = registry.find_by_id("dup").unwrap();
        assert_eq!(found.name, "first");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_readers_never_see_mixed_sets() {
        let old: Vec<_> = (0..32).map(|i| device(&format!("old{i}"), "o", 1)).collect();
        let new: Vec<_> = (0..32).map(|i| device(&format!("new{i}"), "n", 2)).collect();
        let registry = DeviceRegistry::new(old.clone());

        thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..500 {
                    if round % 2 == 0 {
                        registry.replace(new.clone());
                    } else {
                        registry.replace(old.clone());
                    }
                }
            });

            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let snapshot = registry.snapshot();
                        assert_eq!(snapshot.len(), 32);
                        let threshold = snapshot[0].activation_threshold;
                        assert!(snapshot.iter().all(|d| d.activation_threshold == threshold));
                    }
                });
            }
        });
    }
}
