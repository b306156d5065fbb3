//! Block distribution of a global index range over communicator ranks.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Per-rank `(count, offset)` description of a distributed index range.
///
/// Rank `r` owns the global indices `offsets[r]..offsets[r] + counts[r]`.
/// Offsets are the exclusive prefix sum of the counts, so `offsets[0] == 0`.
/// Balanced splits give rank 0 a row whenever the range is non-empty;
/// [`BlockDistribution::from_counts`] can leave rank 0 empty, in which case
/// global row 0 lives on the first non-empty rank.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockDistribution {
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl BlockDistribution {
    /// Balanced split of `global_size` elements over `num_ranks` ranks.
    ///
    /// The first `global_size % num_ranks` ranks receive one extra element,
    /// so counts differ by at most one.
    ///
    /// # Panics
    /// If `num_ranks` is zero.
    pub fn new(global_size: usize, num_ranks: usize) -> Self {
        assert!(num_ranks > 0, "block distribution needs at least one rank");
        let base = global_size / num_ranks;
        let rem = global_size % num_ranks;
        let counts = (0..num_ranks)
            .map(|r| base + usize::from(r < rem))
            .collect();
        Self::from_counts(counts)
    }

    /// Distribution with caller-computed counts.
    ///
    /// # Panics
    /// If `counts` is empty.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        assert!(!counts.is_empty(), "block distribution needs at least one rank");
        let offsets = counts
            .iter()
            .scan(0usize, |acc, &c| {
                let off = *acc;
                *acc += c;
                Some(off)
            })
            .collect();
        Self { counts, offsets }
    }

    /// Muffin-tin layout: whole atoms are dealt to ranks in contiguous,
    /// balanced blocks and each rank owns the basis functions of its atoms.
    ///
    /// # Arguments
    /// * `atom_sizes` - Number of muffin-tin basis functions of each atom
    /// * `num_ranks` - Number of ranks
    pub fn from_atom_partition(atom_sizes: &[usize], num_ranks: usize) -> Self {
        let atoms = Self::new(atom_sizes.len(), num_ranks);
        let counts = (0..num_ranks)
            .map(|r| atom_sizes[atoms.local_range(r)].iter().sum())
            .collect();
        Self::from_counts(counts)
    }

    pub fn num_ranks(&self) -> usize {
        self.counts.len()
    }

    pub fn global_size(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    pub fn offset(&self, rank: usize) -> usize {
        self.offsets[rank]
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Global indices owned by `rank`.
    pub fn local_range(&self, rank: usize) -> Range<usize> {
        self.offsets[rank]..self.offsets[rank] + self.counts[rank]
    }

    /// Rank owning global index `index`, or `None` if it is out of range.
    pub fn rank_of(&self, index: usize) -> Option<usize> {
        if index >= self.global_size() {
            return None;
        }
        // offsets are non-decreasing; skip empty ranks sharing an offset
        let pos = self.offsets.partition_point(|&off| off <= index);
        (0..pos).rev().find(|&r| self.counts[r] > 0)
    }

    /// Rank expected to hold global row 0 (the G=0 plane wave).
    ///
    /// This is rank 0. Use [`BlockDistribution::holds_first_row`] to check
    /// that rank 0 actually stores the row.
    pub fn first_row_rank(&self) -> usize {
        0
    }

    /// Whether [`BlockDistribution::first_row_rank`] stores global row 0.
    /// An empty range trivially satisfies this.
    pub fn holds_first_row(&self) -> bool {
        self.global_size() == 0 || self.counts[self.first_row_rank()] > 0
    }
}
