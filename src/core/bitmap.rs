//! Occupancy bitmap for the cluster table
//!
//! One bit per cluster, packed into 64-bit words:
//! - 0 = free cluster
//! - 1 = occupied cluster
//!
//! Claims are first-fit in ascending cluster order and transactional: a
//! claim either marks every requested cluster or leaves the bitmap
//! exactly as it found it.

use crate::core::ClusterId;
use crate::error::{FatError, Result};

#[derive(Debug, Clone)]
pub struct OccupancyBitmap {
    /// Bitmap words (each word = 64 clusters)
    words: Vec<u64>,

    /// Total number of clusters tracked
    total_clusters: usize,

    /// Number of clusters currently free
    free_clusters: usize,
}

impl OccupancyBitmap {
    /// Create a bitmap with every cluster free
    pub fn new(total_clusters: usize) -> Self {
        let num_words = total_clusters.div_ceil(64);
        OccupancyBitmap {
            words: vec![0u64; num_words],
            total_clusters,
            free_clusters: total_clusters,
        }
    }

    #[inline]
    fn position(id: ClusterId) -> (usize, u32) {
        ((id / 64) as usize, id % 64)
    }

    fn check_range(&self, id: ClusterId) -> Result<()> {
        if id as usize >= self.total_clusters {
            return Err(FatError::IndexOutOfRange {
                index: id as u64,
                capacity: self.total_clusters,
            });
        }
        Ok(())
    }

    /// Whether a cluster is occupied
    pub fn is_occupied(&self, id: ClusterId) -> Result<bool> {
        self.check_range(id)?;
        let (word_idx, bit_idx) = Self::position(id);
        Ok(self.words[word_idx] & (1u64 << bit_idx) != 0)
    }

    /// Occupancy check that treats out-of-range ids as free
    pub fn contains(&self, id: ClusterId) -> bool {
        self.is_occupied(id).unwrap_or(false)
    }

    /// Set the occupancy bit of a single cluster
    pub fn set(&mut self, id: ClusterId, occupied: bool) -> Result<()> {
        self.check_range(id)?;
        let (word_idx, bit_idx) = Self::position(id);
        let mask = 1u64 << bit_idx;
        let was_occupied = self.words[word_idx] & mask != 0;

        match (was_occupied, occupied) {
            (false, true) => {
                self.words[word_idx] |= mask;
                self.free_clusters -= 1;
            }
            (true, false) => {
                self.words[word_idx] &= !mask;
                self.free_clusters += 1;
            }
            _ => {}
        }

        Ok(())
    }

    /// Claim `count` free clusters, lowest ids first
    ///
    /// Returns the claimed ids in ascending order. If the bitmap cannot
    /// supply all of them, every bit set during the scan is cleared again
    /// and `InsufficientSpace` is returned.
    pub fn claim_first_fit(&mut self, count: usize) -> Result<Vec<ClusterId>> {
        if count > self.free_clusters {
            return Err(FatError::InsufficientSpace {
                needed: count as u64,
                available: self.free_clusters,
            });
        }

        let mut claimed = Vec::with_capacity(count);

        'outer: for (word_idx, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue; // All clusters in this word occupied
            }

            for bit_idx in 0..64 {
                if claimed.len() == count {
                    break 'outer;
                }

                if *word & (1u64 << bit_idx) == 0 {
                    let id = word_idx * 64 + bit_idx;

                    // Padding bits of the last word are not clusters
                    if id >= self.total_clusters {
                        break 'outer;
                    }

                    claimed.push(id as ClusterId);
                    *word |= 1u64 << bit_idx;
                }
            }
        }

        if claimed.len() != count {
            let available = claimed.len();
            for &id in &claimed {
                let (word_idx, bit_idx) = Self::position(id);
                self.words[word_idx] &= !(1u64 << bit_idx);
            }
            return Err(FatError::InsufficientSpace {
                needed: count as u64,
                available,
            });
        }

        self.free_clusters -= count;
        Ok(claimed)
    }

    /// Mark clusters free again
    ///
    /// Releasing an already free cluster is logged and skipped.
    pub fn release(&mut self, ids: &[ClusterId]) -> Result<()> {
        for &id in ids {
            self.check_range(id)?;
        }

        for &id in ids {
            let (word_idx, bit_idx) = Self::position(id);
            let mask = 1u64 << bit_idx;

            if self.words[word_idx] & mask == 0 {
                tracing::warn!("Double release detected for cluster {}", id);
                continue;
            }

            self.words[word_idx] &= !mask;
            self.free_clusters += 1;
        }

        Ok(())
    }

    pub fn total_clusters(&self) -> usize {
        self.total_clusters
    }

    pub fn free_clusters(&self) -> usize {
        self.free_clusters
    }

    pub fn occupied_clusters(&self) -> usize {
        self.total_clusters - self.free_clusters
    }

    /// Iterate occupancy of every cluster in id order
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.total_clusters).map(move |id| {
            let (word_idx, bit_idx) = Self::position(id as ClusterId);
            self.words[word_idx] & (1u64 << bit_idx) != 0
        })
    }

    /// Free/occupied transitions normalized by capacity
    ///
    /// 0.0 for an empty or completely full table; grows as occupied
    /// clusters get scattered.
    pub fn fragmentation_score(&self) -> f64 {
        if self.total_clusters == 0 {
            return 0.0;
        }

        let mut transitions = 0usize;
        let mut prev_occupied = false;

        for occupied in self.iter() {
            if occupied != prev_occupied {
                transitions += 1;
            }
            prev_occupied = occupied;
        }

        (transitions as f64) / (self.total_clusters as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_creation() {
        let bitmap = OccupancyBitmap::new(100);
        assert_eq!(bitmap.total_clusters(), 100);
        assert_eq!(bitmap.free_clusters(), 100);
        assert_eq!(bitmap.occupied_clusters(), 0);
        assert!(bitmap.iter().all(|occupied| !occupied));
    }

    #[test]
    fn test_claim_is_first_fit() {
        let mut bitmap = OccupancyBitmap::new(16);
        bitmap.set(1, true).unwrap();
        bitmap.set(3, true).unwrap();

        let claimed = bitmap.claim_first_fit(4).unwrap();
        assert_eq!(claimed, vec![0, 2, 4, 5]);
        assert_eq!(bitmap.free_clusters(), 10);
    }

    #[test]
    fn test_claim_across_word_boundary() {
        let mut bitmap = OccupancyBitmap::new(130);
        let first = bitmap.claim_first_fit(63).unwrap();
        assert_eq!(first.last(), Some(&62));

        let second = bitmap.claim_first_fit(3).unwrap();
        assert_eq!(second, vec![63, 64, 65]);
    }

    #[test]
    fn test_claim_insufficient_space_leaves_bitmap_unchanged() {
        let mut bitmap = OccupancyBitmap::new(10);
        bitmap.claim_first_fit(7).unwrap();

        let before: Vec<bool> = bitmap.iter().collect();
        let result = bitmap.claim_first_fit(4);
        assert!(matches!(
            result,
            Err(FatError::InsufficientSpace {
                needed: 4,
                available: 3
            })
        ));

        let after: Vec<bool> = bitmap.iter().collect();
        assert_eq!(before, after);
        assert_eq!(bitmap.free_clusters(), 3);
    }

    #[test]
    fn test_claim_never_uses_padding_bits() {
        let mut bitmap = OccupancyBitmap::new(5);
        let claimed = bitmap.claim_first_fit(5).unwrap();
        assert_eq!(claimed, vec![0, 1, 2, 3, 4]);
        assert!(bitmap.claim_first_fit(1).is_err());
    }

    #[test]
    fn test_release() {
        let mut bitmap = OccupancyBitmap::new(32);
        let claimed = bitmap.claim_first_fit(10).unwrap();
        bitmap.release(&claimed).unwrap();

        assert_eq!(bitmap.free_clusters(), 32);
        for &id in &claimed {
            assert!(!bitmap.is_occupied(id).unwrap());
        }
    }

    #[test]
    fn test_double_release_does_not_inflate_free_count() {
        let mut bitmap = OccupancyBitmap::new(8);
        let claimed = bitmap.claim_first_fit(2).unwrap();
        bitmap.release(&claimed).unwrap();
        bitmap.release(&claimed).unwrap();
        assert_eq!(bitmap.free_clusters(), 8);
    }

    #[test]
    fn test_out_of_range() {
        let mut bitmap = OccupancyBitmap::new(16);
        assert!(matches!(
            bitmap.is_occupied(16),
            Err(FatError::IndexOutOfRange {
                index: 16,
                capacity: 16
            })
        ));
        assert!(bitmap.set(100, true).is_err());
        assert!(bitmap.release(&[0, 16]).is_err());
        assert!(!bitmap.contains(16));
    }

    #[test]
    fn test_set_is_idempotent_on_free_count() {
        let mut bitmap = OccupancyBitmap::new(4);
        bitmap.set(2, true).unwrap();
        bitmap.set(2, true).unwrap();
        assert_eq!(bitmap.free_clusters(), 3);
        bitmap.set(2, false).unwrap();
        bitmap.set(2, false).unwrap();
        assert_eq!(bitmap.free_clusters(), 4);
    }

    #[test]
    fn test_fragmentation_score() {
        let mut bitmap = OccupancyBitmap::new(64);
        assert_eq!(bitmap.fragmentation_score(), 0.0);

        bitmap.claim_first_fit(8).unwrap();
        let contiguous = bitmap.fragmentation_score();

        for id in (0..8).step_by(2) {
            bitmap.set(id, false).unwrap();
        }
        let scattered = bitmap.fragmentation_score();

        assert!(contiguous > 0.0);
        assert!(scattered > contiguous);
    }
}
