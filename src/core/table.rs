//! Cluster allocation table
//!
//! Two parallel arrays of `2^pointer_bits` entries: the occupancy bitmap
//! and the next-pointer table. A file is nothing more than the id of its
//! first cluster; following next pointers from there until [`CHAIN_END`]
//! yields the rest of the file.
//!
//! ```text
//! id:       0    1    2    3    4    5    6    7
//! occupied: 1    1    0    1    1    0    0    0
//! next:     1    3    -    4    -    -    -    -
//!
//! file @0 = [0, 1, 3, 4]
//! ```
//!
//! Clusters change state only through [`ClusterTable::allocate`] and
//! [`ClusterTable::append`] (free -> occupied) and
//! [`ClusterTable::delete_file`] (occupied -> free). Failed allocations
//! leave the table untouched.

use crate::bitmap::OccupancyBitmap;
use crate::chain::Chain;
use crate::config::TableConfig;
use crate::core::{Allocation, ClusterId, CHAIN_END};
use crate::error::{FatError, Result};
use crate::snapshot::{ClusterStatus, TableSnapshot, TableStats};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ClusterTable {
    pointer_bits: u32,
    cluster_bytes: u64,
    bitmap: OccupancyBitmap,
    links: Vec<ClusterId>,
}

impl ClusterTable {
    /// Create a table of `2^pointer_bits` free clusters
    ///
    /// # Errors
    ///
    /// `InvalidPointerBits` if `pointer_bits` is outside `1..=24`,
    /// `InvalidClusterSize` if `cluster_bytes` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use fat_sim::ClusterTable;
    ///
    /// let table = ClusterTable::new(4, 1024).unwrap();
    /// assert_eq!(table.capacity(), 16);
    /// assert_eq!(table.free_clusters(), 16);
    /// ```
    pub fn new(pointer_bits: u32, cluster_bytes: u64) -> Result<Self> {
        Self::from_config(&TableConfig::new(pointer_bits, cluster_bytes))
    }

    /// Create a table from a validated geometry
    pub fn from_config(config: &TableConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity();

        debug!(
            "Creating cluster table: {} clusters of {} bytes",
            capacity, config.cluster_bytes
        );

        Ok(ClusterTable {
            pointer_bits: config.pointer_bits,
            cluster_bytes: config.cluster_bytes,
            bitmap: OccupancyBitmap::new(capacity),
            links: vec![CHAIN_END; capacity],
        })
    }

    pub fn capacity(&self) -> usize {
        self.links.len()
    }

    pub fn pointer_bits(&self) -> u32 {
        self.pointer_bits
    }

    pub fn cluster_bytes(&self) -> u64 {
        self.cluster_bytes
    }

    pub fn config(&self) -> TableConfig {
        TableConfig::new(self.pointer_bits, self.cluster_bytes)
    }

    pub fn free_clusters(&self) -> usize {
        self.bitmap.free_clusters()
    }

    pub fn occupied_clusters(&self) -> usize {
        self.bitmap.occupied_clusters()
    }

    /// Number of clusters needed to hold `bytes` bytes
    pub fn clusters_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.cluster_bytes)
    }

    fn check_range(&self, id: ClusterId) -> Result<usize> {
        let index = id as usize;
        if index >= self.links.len() {
            return Err(FatError::IndexOutOfRange {
                index: id as u64,
                capacity: self.links.len(),
            });
        }
        Ok(index)
    }

    /// Set the occupancy bit of one cluster
    ///
    /// Low-level primitive: chains are not updated.
    pub fn set_status(&mut self, id: ClusterId, occupied: bool) -> Result<()> {
        self.bitmap.set(id, occupied)
    }

    /// Whether one cluster is occupied
    pub fn get_status(&self, id: ClusterId) -> Result<bool> {
        self.bitmap.is_occupied(id)
    }

    /// Overwrite the next pointer of one cluster
    ///
    /// Low-level primitive: `target` is stored as given and is not checked
    /// against the table. `None` terminates the chain.
    pub fn set_next(&mut self, id: ClusterId, target: Option<ClusterId>) -> Result<()> {
        let index = self.check_range(id)?;
        self.links[index] = target.unwrap_or(CHAIN_END);
        Ok(())
    }

    /// Next pointer of one cluster, `None` at the end of a chain
    pub fn get_next(&self, id: ClusterId) -> Result<Option<ClusterId>> {
        let index = self.check_range(id)?;
        let link = self.links[index];
        Ok((link != CHAIN_END).then_some(link))
    }

    /// Claim clusters for `bytes` bytes and link them into one chain
    ///
    /// Shared by `allocate` and `append`. The claimed ids are linked in
    /// ascending order and the last one terminates the chain. On failure
    /// nothing has been modified.
    fn claim_chain(&mut self, bytes: u64) -> Result<Vec<ClusterId>> {
        let needed = self.clusters_for(bytes);

        if needed > self.bitmap.free_clusters() as u64 {
            warn!(
                "Cannot allocate {} bytes: {} clusters needed, {} free",
                bytes,
                needed,
                self.bitmap.free_clusters()
            );
            return Err(FatError::InsufficientSpace {
                needed,
                available: self.bitmap.free_clusters(),
            });
        }

        let clusters = self.bitmap.claim_first_fit(needed as usize)?;

        for pair in clusters.windows(2) {
            self.links[pair[0] as usize] = pair[1];
        }
        if let Some(&last) = clusters.last() {
            self.links[last as usize] = CHAIN_END;
        }

        Ok(clusters)
    }

    /// Allocate clusters for a new file of `bytes` bytes
    ///
    /// Clusters are taken first-fit in ascending id order. A zero-byte
    /// file consumes nothing and yields [`Allocation::Empty`].
    ///
    /// # Errors
    ///
    /// `InsufficientSpace` if fewer than `ceil(bytes / cluster_bytes)`
    /// clusters are free; the table is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use fat_sim::{Allocation, ClusterTable};
    ///
    /// let mut table = ClusterTable::new(4, 1024).unwrap();
    /// let file = table.allocate(3072).unwrap();
    /// assert_eq!(file, Allocation::Chain(0));
    /// assert_eq!(table.get_cluster_list(0).unwrap(), vec![0, 1, 2]);
    /// ```
    pub fn allocate(&mut self, bytes: u64) -> Result<Allocation> {
        if bytes == 0 {
            return Ok(Allocation::Empty);
        }

        let clusters = self.claim_chain(bytes)?;
        let start = clusters[0];

        debug!(
            "Allocated {} clusters for {} bytes starting at cluster {}",
            clusters.len(),
            bytes,
            start
        );

        Ok(Allocation::Chain(start))
    }

    /// Grow the file starting at `start` by `bytes` bytes
    ///
    /// New clusters are chosen exactly as in [`allocate`](Self::allocate)
    /// and spliced after the current tail. The file keeps its identity, so
    /// `start` is returned.
    ///
    /// # Errors
    ///
    /// - `InvalidHandle` if `start` is not an occupied cluster
    /// - `InsufficientSpace` if not enough clusters are free
    /// - `CorruptChain` if the existing chain cannot be walked
    ///
    /// The existing chain is untouched on every error.
    pub fn append(&mut self, start: ClusterId, bytes: u64) -> Result<ClusterId> {
        if !self.bitmap.contains(start) {
            return Err(FatError::InvalidHandle(start));
        }

        if bytes == 0 {
            return Ok(start);
        }

        let mut tail = start;
        for id in self.chain(start) {
            tail = id?;
        }

        let clusters = self.claim_chain(bytes)?;
        self.links[tail as usize] = clusters[0];

        debug!(
            "Appended {} clusters to file at cluster {} after tail {}",
            clusters.len(),
            start,
            tail
        );

        Ok(start)
    }

    /// Iterate the clusters of the file starting at `start`
    pub fn chain(&self, start: ClusterId) -> Chain<'_> {
        Chain::new(&self.bitmap, &self.links, start)
    }

    /// All clusters of the file starting at `start`, in chain order
    ///
    /// A free or out-of-range `start` is an empty list, not an error.
    /// `CorruptChain` is returned only for a malformed table.
    pub fn get_cluster_list(&self, start: ClusterId) -> Result<Vec<ClusterId>> {
        self.chain(start).collect()
    }

    /// Cluster holding byte `offset` of the file starting at `start`
    ///
    /// Returns `Ok(None)` when `start` is not occupied or the offset lies
    /// beyond the end of the chain.
    pub fn seek_cluster(&self, start: ClusterId, offset: u64) -> Result<Option<ClusterId>> {
        let hops = offset / self.cluster_bytes;
        let mut chain = self.chain(start);

        for _ in 0..hops {
            match chain.next() {
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }

        chain.next().transpose()
    }

    /// Release every cluster of the file starting at `start`
    ///
    /// Each released cluster is marked free and its next pointer reset.
    /// A free or out-of-range `start` is a no-op. If `start` sits in the
    /// middle of another chain, that chain is terminated at the preceding
    /// cluster so no occupied cluster points into freed space.
    ///
    /// Returns the number of clusters released.
    pub fn delete_file(&mut self, start: ClusterId) -> Result<usize> {
        if !self.bitmap.contains(start) {
            return Ok(0);
        }

        let clusters = self.get_cluster_list(start)?;

        if let Some(prev) = self.predecessor(start) {
            debug!(
                "Cluster {} precedes deleted start {}, terminating its chain",
                prev, start
            );
            self.links[prev as usize] = CHAIN_END;
        }

        for &id in &clusters {
            self.links[id as usize] = CHAIN_END;
        }
        self.bitmap.release(&clusters)?;

        debug!("Deleted file at cluster {} ({} clusters)", start, clusters.len());

        Ok(clusters.len())
    }

    /// Occupied cluster whose next pointer is `id`
    fn predecessor(&self, id: ClusterId) -> Option<ClusterId> {
        self.links
            .iter()
            .enumerate()
            .find(|&(from, &link)| link == id && self.bitmap.contains(from as ClusterId))
            .map(|(from, _)| from as ClusterId)
    }

    /// Number of occupied clusters pointing at each cluster
    fn in_degrees(&self) -> Vec<u32> {
        let mut degrees = vec![0u32; self.links.len()];
        for (from, &link) in self.links.iter().enumerate() {
            if link == CHAIN_END || !self.bitmap.contains(from as ClusterId) {
                continue;
            }
            if let Some(degree) = degrees.get_mut(link as usize) {
                *degree += 1;
            }
        }
        degrees
    }

    /// Start clusters of every file currently in the table
    ///
    /// An occupied cluster is a start cluster when no occupied cluster
    /// points at it.
    pub fn chain_heads(&self) -> Vec<ClusterId> {
        self.in_degrees()
            .iter()
            .zip(self.bitmap.iter())
            .enumerate()
            .filter(|&(_, (&degree, occupied))| occupied && degree == 0)
            .map(|(id, _)| id as ClusterId)
            .collect()
    }

    /// Check the structural invariants of the whole table
    ///
    /// - free clusters carry no next pointer
    /// - occupied clusters point only at occupied clusters
    /// - no cluster has two predecessors
    /// - every occupied cluster is reachable from exactly one start
    ///   cluster (no cycles)
    pub fn verify(&self) -> Result<()> {
        let corrupt = |start: ClusterId, reason: String| FatError::CorruptChain { start, reason };

        for (index, occupied) in self.bitmap.iter().enumerate() {
            let id = index as ClusterId;
            let link = self.links[index];

            if !occupied {
                if link != CHAIN_END {
                    return Err(corrupt(id, format!("free cluster {} still links to {}", id, link)));
                }
                continue;
            }

            if link != CHAIN_END && !self.bitmap.contains(link) {
                return Err(corrupt(id, format!("cluster {} links to non-occupied cluster {}", id, link)));
            }
        }

        if let Some(id) = self.in_degrees().iter().position(|&degree| degree > 1) {
            return Err(corrupt(id as ClusterId, format!("cluster {} shared between chains", id)));
        }

        let mut reachable = vec![false; self.links.len()];
        for head in self.chain_heads() {
            for id in self.chain(head) {
                reachable[id? as usize] = true;
            }
        }

        let orphan = self
            .bitmap
            .iter()
            .zip(reachable.iter())
            .position(|(occupied, &seen)| occupied && !seen);
        if let Some(id) = orphan {
            return Err(corrupt(
                id as ClusterId,
                format!("cluster {} is not reachable from any start cluster", id),
            ));
        }

        Ok(())
    }

    /// Copy of every cluster's `(id, occupied, next)` triple
    pub fn status_snapshot(&self) -> TableSnapshot {
        let clusters = self
            .bitmap
            .iter()
            .zip(self.links.iter())
            .enumerate()
            .map(|(id, (occupied, &link))| ClusterStatus {
                id: id as ClusterId,
                occupied,
                next: (link != CHAIN_END).then_some(link),
            })
            .collect();

        TableSnapshot {
            pointer_bits: self.pointer_bits,
            cluster_bytes: self.cluster_bytes,
            clusters,
        }
    }

    /// Occupancy summary of the table
    pub fn stats(&self) -> TableStats {
        TableStats {
            capacity: self.capacity(),
            cluster_bytes: self.cluster_bytes,
            occupied_clusters: self.occupied_clusters(),
            free_clusters: self.free_clusters(),
            files: self.chain_heads().len(),
            fragmentation_score: self.bitmap.fragmentation_score(),
        }
    }
}
