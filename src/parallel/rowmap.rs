//! Contiguous block-row ownership.

use std::sync::Arc;

use super::Comm;

/// Partition of the global block-row index space into contiguous per-rank
/// ranges: rank r owns `[ranges[r], ranges[r+1])`.
pub struct RowMap {
    rank: usize,
    ranges: Vec<usize>,
}

impl RowMap {
    /// Build the map from this rank's owned block-row count. Collective.
    pub fn new(comm: &dyn Comm, n_local: usize) -> Arc<RowMap> {
        let counts = comm.all_gather_usize(n_local);
        let mut ranges = Vec::with_capacity(counts.len() + 1);
        let mut total = 0;
        ranges.push(0);
        for c in counts {
            total += c;
            ranges.push(total);
        }
        Arc::new(RowMap {
            rank: comm.rank(),
            ranges,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_ranks(&self) -> usize {
        self.ranges.len() - 1
    }

    /// Number of block rows owned by this rank.
    pub fn local_dim(&self) -> usize {
        self.ranges[self.rank + 1] - self.ranges[self.rank]
    }

    pub fn global_dim(&self) -> usize {
        self.ranges[self.ranges.len() - 1]
    }

    /// Half-open global range owned by `rank`.
    pub fn owner_range(&self, rank: usize) -> (usize, usize) {
        (self.ranges[rank], self.ranges[rank + 1])
    }

    /// The rank owning `global`. O(log P).
    pub fn owner_of(&self, global: usize) -> usize {
        debug_assert!(global < self.global_dim());
        self.ranges.partition_point(|&lo| lo <= global) - 1
    }

    pub fn is_owned(&self, global: usize) -> bool {
        let (lo, hi) = self.owner_range(self.rank);
        global >= lo && global < hi
    }

    /// Local index of `global` on this rank, if owned here.
    pub fn to_local(&self, global: usize) -> Option<usize> {
        let (lo, hi) = self.owner_range(self.rank);
        if global >= lo && global < hi {
            Some(global - lo)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;

    fn map_with_ranges(rank: usize, ranges: Vec<usize>) -> RowMap {
        RowMap { rank, ranges }
    }

    #[test]
    fn serial_map_owns_everything() {
        let map = RowMap::new(&SerialComm, 6);
        assert_eq!(map.local_dim(), 6);
        assert_eq!(map.global_dim(), 6);
        assert_eq!(map.owner_of(5), 0);
        assert_eq!(map.to_local(3), Some(3));
    }

    #[test]
    fn owner_lookup_hits_range_boundaries() {
        let map = map_with_ranges(1, vec![0, 4, 8, 11]);
        assert_eq!(map.owner_of(0), 0);
        assert_eq!(map.owner_of(3), 0);
        assert_eq!(map.owner_of(4), 1);
        assert_eq!(map.owner_of(7), 1);
        assert_eq!(map.owner_of(8), 2);
        assert_eq!(map.owner_of(10), 2);
        assert_eq!(map.local_dim(), 4);
        assert_eq!(map.to_local(6), Some(2));
        assert_eq!(map.to_local(8), None);
    }

    #[test]
    fn ranks_with_no_rows_are_skipped() {
        let map = map_with_ranges(0, vec![0, 2, 2, 5]);
        assert_eq!(map.owner_of(1), 0);
        // Rank 1 owns nothing; index 2 belongs to rank 2.
        assert_eq!(map.owner_of(2), 2);
    }
}
