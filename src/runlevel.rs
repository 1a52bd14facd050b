// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Latest runlevel broadcast by the controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::ParseError;
use crate::trigger::DispatchTrigger;

/// Process-wide runlevel, default 0.
///
/// Every store raises the dispatch trigger, even when the value did not
/// change, since the registry may have changed in the meantime.
#[derive(Debug)]
pub struct RunlevelState {
    value: AtomicI64,
    trigger: Arc<DispatchTrigger>,
}

impl RunlevelState {
    /// Creates a runlevel of 0 bound to `trigger`.
    #[must_use]
    pub fn new(trigger: Arc<DispatchTrigger>) -> Self {
        Self {
            value: AtomicI64::new(0),
            trigger,
        }
    }

    /// Stores `value` and raises the dispatch trigger.
    pub fn set(&self, value: i64) {
        let previous = self.value.swap(value, Ordering::AcqRel);
        tracing::debug!(previous, runlevel = value, "Runlevel updated");
        self.trigger.raise();
    }

    /// Returns the latest stored runlevel.
    #[must_use]
    pub fn current(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}

/// Parses a raw `system/runlevel` payload.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns error if the payload is not UTF-8 or not a base-10 integer.
pub fn parse_runlevel(payload: &[u8]) -> Result<i64, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?;
    let text = text.trim();
    text.parse()
        .map_err(|_| ParseError::InvalidRunlevel(text.to_string()))
}
