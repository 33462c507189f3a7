// EDB - Ethereum Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Debugger configuration.

use std::{fs, path::Path};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for a debugger instance.
///
/// Every field has a default, so a TOML file only needs to name the settings
/// it changes:
///
/// ```toml
/// max_array_elements = 64
/// decode_storage = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Maximum number of elements decoded from a single array
    pub max_array_elements: usize,
    /// Maximum number of entries decoded from a single mapping
    pub max_mapping_entries: usize,
    /// Maximum number of bytes decoded from a single `bytes` or `string`
    pub max_bytes_length: usize,
    /// Whether pause snapshots decode the state variables of each call
    pub decode_storage: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            max_array_elements: 256,
            max_mapping_entries: 256,
            max_bytes_length: 4096,
            decode_storage: true,
        }
    }
}

impl DebuggerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        debug!("Loaded debugger configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config as TOML")
    }

    /// Set the cap on decoded array elements
    pub fn with_max_array_elements(mut self, max: usize) -> Self {
        self.max_array_elements = max;
        self
    }

    /// Set the cap on decoded mapping entries
    pub fn with_max_mapping_entries(mut self, max: usize) -> Self {
        self.max_mapping_entries = max;
        self
    }

    /// Set the cap on decoded `bytes`/`string` length
    pub fn with_max_bytes_length(mut self, max: usize) -> Self {
        self.max_bytes_length = max;
        self
    }

    /// Enable or disable state variable decoding in snapshots
    pub fn with_decode_storage(mut self, decode: bool) -> Self {
        self.decode_storage = decode;
        self
    }

    /// Decoding caps derived from this configuration
    pub fn limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_array_elements: self.max_array_elements,
            max_mapping_entries: self.max_mapping_entries,
            max_bytes_length: self.max_bytes_length,
        }
    }
}

/// Caps applied while decoding values.
///
/// Dynamic lengths read from storage or calldata are attacker controlled, so
/// every decoder truncates to these limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum number of array elements
    pub max_array_elements: usize,
    /// Maximum number of mapping entries
    pub max_mapping_entries: usize,
    /// Maximum number of bytes
    pub max_bytes_length: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DebuggerConfig::default().limits()
    }
}
