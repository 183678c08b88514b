//! Bounded traversal of cluster chains

use crate::bitmap::OccupancyBitmap;
use crate::core::{ClusterId, CHAIN_END};
use crate::error::{FatError, Result};
use std::iter::FusedIterator;

/// Iterator over the clusters of one file, starting with its start cluster
///
/// Yields nothing when the start cluster is free or outside the table.
/// The walk visits at most `capacity` clusters; a longer chain can only be
/// a cycle and is reported as [`FatError::CorruptChain`], as is a link
/// that leaves the table or lands on a free cluster. The iterator is
/// fused after the first error.
pub struct Chain<'a> {
    bitmap: &'a OccupancyBitmap,
    links: &'a [ClusterId],
    start: ClusterId,
    prev: Option<ClusterId>,
    current: Option<ClusterId>,
    visited: usize,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(bitmap: &'a OccupancyBitmap, links: &'a [ClusterId], start: ClusterId) -> Self {
        let current = bitmap.contains(start).then_some(start);
        Chain {
            bitmap,
            links,
            start,
            prev: None,
            current,
            visited: 0,
        }
    }

    fn fault(&mut self, reason: String) -> Option<Result<ClusterId>> {
        self.current = None;
        tracing::warn!("Corrupt chain at start cluster {}: {}", self.start, reason);
        Some(Err(FatError::CorruptChain {
            start: self.start,
            reason,
        }))
    }
}

impl Iterator for Chain<'_> {
    type Item = Result<ClusterId>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;

        if self.visited == self.links.len() {
            return self.fault(format!(
                "chain exceeds table capacity of {} clusters (cycle)",
                self.links.len()
            ));
        }

        if id as usize >= self.links.len() {
            return self.fault(format!(
                "cluster {} links outside the table to {}",
                self.prev.unwrap_or(self.start),
                id
            ));
        }

        if !self.bitmap.contains(id) {
            return self.fault(format!(
                "cluster {} links to free cluster {}",
                self.prev.unwrap_or(self.start),
                id
            ));
        }

        self.visited += 1;
        self.prev = Some(id);

        let link = self.links[id as usize];
        self.current = (link != CHAIN_END).then_some(link);

        Some(Ok(id))
    }
}

impl FusedIterator for Chain<'_> {}
