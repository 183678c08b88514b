//! Cluster allocation engine
//!
//! - [`table`] - the [`ClusterTable`](table::ClusterTable) itself
//! - [`bitmap`] - occupancy bitmap with transactional first-fit claims
//! - [`chain`] - bounded chain traversal
//! - [`snapshot`] - read-only views for inspection and reporting
//! - [`config`] - table geometry and TOML loading
//! - [`error`] - error types

pub mod bitmap;
pub mod chain;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod table;

use serde::{Deserialize, Serialize};

/// Index of a cluster in the table
pub type ClusterId = u32;

/// Stored in the pointer table to terminate a chain
///
/// Lies outside every valid table, so it can never be mistaken for a real
/// cluster. The public API reports it as `None`.
pub const CHAIN_END: ClusterId = ClusterId::MAX;

/// Outcome of a successful [`allocate`](table::ClusterTable::allocate)
///
/// A zero-byte file owns no clusters and is reported as `Empty`, so it
/// cannot be confused with a file whose chain starts at cluster 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Allocation {
    /// Zero-length file, no clusters consumed
    Empty,
    /// File whose chain starts at the given cluster
    Chain(ClusterId),
}

impl Allocation {
    /// Start cluster of the file, if it owns any clusters
    pub fn start(&self) -> Option<ClusterId> {
        match self {
            Allocation::Empty => None,
            Allocation::Chain(start) => Some(*start),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Allocation::Empty)
    }
}
