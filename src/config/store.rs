// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistence of the last received server configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::ServerConfig;
use crate::error::ConfigError;

/// JSON file holding the last `config/room` document.
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so a crash mid-write leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted configuration.
    ///
    /// Returns `Ok(None)` if nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or interpreted.
    pub fn load(&self) -> Result<Option<ServerConfig>, ConfigError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No persisted configuration");
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let malformed = |source| ConfigError::Malformed {
            path: self.path.clone(),
            source,
        };
        let document: serde_json::Value = serde_json::from_str(&contents).map_err(malformed)?;
        let config = ServerConfig::from_value(&document).map_err(malformed)?;

        tracing::info!(
            path = %self.path.display(),
            devices = config.devices().len(),
            "Loaded persisted configuration"
        );
        Ok(Some(config))
    }

    /// Persists `document` as received, pretty-printed.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn save(&self, document: &serde_json::Value) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let contents = serde_json::to_string_pretty(document).map_err(|source| {
            ConfigError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;

        let staging = self.staging_path();
        fs::write(&staging, contents).map_err(io_error)?;
        fs::rename(&staging, &self.path).map_err(io_error)?;

        tracing::debug!(path = %self.path.display(), "Persisted configuration");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
