//! Read-only views of a cluster table
//!
//! Snapshots are detached copies: mutating the table afterwards does not
//! change them. They are meant for debugging output and for comparing
//! table state before and after an operation.

use crate::core::ClusterId;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a single cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub id: ClusterId,
    pub occupied: bool,
    /// Next cluster in the chain, `None` at the end
    pub next: Option<ClusterId>,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.occupied { "Occupied" } else { "Free" };
        match self.next {
            Some(next) => write!(f, "Cluster {}: {}, next: {}", self.id, state, next),
            None => write!(f, "Cluster {}: {}, next: -", self.id, state),
        }
    }
}

/// Every cluster of a table, in id order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub pointer_bits: u32,
    pub cluster_bytes: u64,
    pub clusters: Vec<ClusterStatus>,
}

impl TableSnapshot {
    /// Ids of all occupied clusters
    pub fn occupied(&self) -> Vec<ClusterId> {
        self.clusters
            .iter()
            .filter(|c| c.occupied)
            .map(|c| c.id)
            .collect()
    }

    /// Ids whose occupancy or next pointer differs from `other`
    pub fn diff(&self, other: &TableSnapshot) -> Vec<ClusterId> {
        self.clusters
            .iter()
            .zip(other.clusters.iter())
            .filter(|(a, b)| a != b)
            .map(|(a, _)| a.id)
            .collect()
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for TableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cluster status ({} clusters of {} bytes):",
            self.clusters.len(),
            self.cluster_bytes
        )?;
        for cluster in &self.clusters {
            writeln!(f, "{}", cluster)?;
        }
        Ok(())
    }
}

/// Occupancy summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub capacity: usize,
    pub cluster_bytes: u64,
    pub occupied_clusters: usize,
    pub free_clusters: usize,
    /// Number of distinct chains (files) in the table
    pub files: usize,
    /// Free/occupied transitions over capacity (0.0 = unfragmented)
    pub fragmentation_score: f64,
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files, {}/{} clusters occupied ({} bytes each), fragmentation {:.3}",
            self.files,
            self.occupied_clusters,
            self.capacity,
            self.cluster_bytes,
            self.fragmentation_score
        )
    }
}
