//! Table geometry configuration
//!
//! A table is described by two numbers: the width of a cluster pointer in
//! bits (which fixes the capacity at `2^pointer_bits` clusters) and the
//! size of one cluster in bytes. Both can be read from a TOML file:
//!
//! ```toml
//! pointer_bits = 16
//! cluster_bytes = 2048
//! ```

use crate::error::{FatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest accepted pointer width
pub const MIN_POINTER_BITS: u32 = 1;

/// Largest accepted pointer width (16M clusters)
pub const MAX_POINTER_BITS: u32 = 24;

/// Geometry of a cluster allocation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Pointer width in bits; capacity is `2^pointer_bits` clusters
    pub pointer_bits: u32,

    /// Bytes per cluster, strictly positive
    pub cluster_bytes: u64,
}

impl TableConfig {
    pub fn new(pointer_bits: u32, cluster_bytes: u64) -> Self {
        TableConfig {
            pointer_bits,
            cluster_bytes,
        }
    }

    /// Parse a configuration from TOML text
    ///
    /// Missing keys fall back to [`TableConfig::default`]. The result is
    /// validated before it is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use fat_sim::TableConfig;
    ///
    /// let config = TableConfig::from_toml_str("pointer_bits = 8\ncluster_bytes = 512").unwrap();
    /// assert_eq!(config.capacity(), 256);
    /// assert_eq!(config.cluster_bytes, 512);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TableConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loaded table config from {:?}", path.as_ref());
        Self::from_toml_str(&text)
    }

    /// Check that the geometry describes a buildable table
    pub fn validate(&self) -> Result<()> {
        if !(MIN_POINTER_BITS..=MAX_POINTER_BITS).contains(&self.pointer_bits) {
            return Err(FatError::InvalidPointerBits(self.pointer_bits));
        }

        if self.cluster_bytes == 0 {
            return Err(FatError::InvalidClusterSize(self.cluster_bytes));
        }

        Ok(())
    }

    /// Number of clusters a table with this geometry holds
    pub fn capacity(&self) -> usize {
        1usize << self.pointer_bits
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig::new(4, 1024)
    }
}
