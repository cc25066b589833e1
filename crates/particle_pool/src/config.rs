//! # Pool Configuration
//!
//! Loaded once at startup, never touched on the hot path.
//!
//! ```toml
//! pool_size_kb = 16384
//! report_on_reset = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Default pool size in KB (16 MB).
pub const DEFAULT_POOL_SIZE_KB: usize = 16 << 10;

/// Configuration for a particle pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Backing store size in KB. Rounded up to whole 4 KB super-blocks.
    pub pool_size_kb: usize,
    /// Log a memory report every time the pool is reset.
    pub report_on_reset: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size_kb: DEFAULT_POOL_SIZE_KB,
            report_on_reset: false,
        }
    }
}

impl PoolConfig {
    /// Parses a configuration from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] on malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> PoolResult<Self> {
        toml::from_str(text).map_err(|e| PoolError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Backing store request in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::CapacityOverflow`] if the size does not fit `usize`.
    pub fn byte_count(&self) -> PoolResult<usize> {
        self.pool_size_kb
            .checked_mul(1024)
            .ok_or(PoolError::CapacityOverflow {
                bytes: usize::MAX,
                limit: usize::MAX,
            })
    }
}
