//! # fat-sim - FAT-Style Cluster Allocation Table
//!
//! `fat-sim` models the cluster-allocation layer of a File Allocation Table
//! filesystem, entirely in memory:
//!
//! - **Fixed capacity**: `2^pointer_bits` clusters, never resized
//! - **Occupancy bitmap** plus a parallel **next-pointer table**
//! - **Files as chains**: a file is identified by its start cluster
//! - **First-fit, all-or-nothing allocation**: failed requests leave the
//!   table exactly as they found it
//!
//! There is no byte storage, no directory tree and no on-disk format; the
//! table tracks which clusters belong to which chain and nothing else.
//!
//! ## Quick Start
//!
//! ```rust
//! use fat_sim::{ClusterTable, Result};
//!
//! # fn main() -> Result<()> {
//! // 16 clusters of 1 KiB
//! let mut table = ClusterTable::new(4, 1024)?;
//!
//! let report = table.allocate(3 * 1024)?.start().unwrap();
//! let notes = table.allocate(5 * 1024)?.start().unwrap();
//!
//! assert_eq!(table.get_cluster_list(report)?, vec![0, 1, 2]);
//! assert_eq!(table.get_cluster_list(notes)?, vec![3, 4, 5, 6, 7]);
//!
//! // Grow a file; its start cluster never changes
//! table.append(report, 1024)?;
//! assert_eq!(table.seek_cluster(report, 3 * 1024)?, Some(8));
//!
//! table.delete_file(report)?;
//! assert_eq!(table.free_clusters(), 11);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use fat_sim::{ClusterTable, TableConfig};
//!
//! let config = TableConfig::from_toml_str("pointer_bits = 16\ncluster_bytes = 2048").unwrap();
//! let table = ClusterTable::from_config(&config).unwrap();
//! assert_eq!(table.capacity(), 65536);
//! ```
//!
//! ## Concurrency
//!
//! A [`ClusterTable`] has no interior locking. Mutating operations take
//! `&mut self`, so sharing one table between threads requires an external
//! lock that serializes callers.

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{bitmap, chain, config, error, snapshot, table};

pub use crate::core::{
    chain::Chain,
    config::{TableConfig, MAX_POINTER_BITS, MIN_POINTER_BITS},
    error::{FatError, Result},
    snapshot::{ClusterStatus, TableSnapshot, TableStats},
    table::ClusterTable,
    Allocation, ClusterId, CHAIN_END,
};
