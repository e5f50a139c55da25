//! Work partitioning.
//!
//! The active set is the sub-window's linear indices (ascending) filtered by
//! the mask. It is cut into at most `threads × splits` near-equal chunks, so
//! each block holds roughly the same number of *fits* regardless of where the
//! excluded voxels sit in the grid.

use std::ops::Range;

use crate::volume::{Geometry, Mask, Region};

/// A contiguous run of active voxels handled by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: usize,
    /// Active voxel indices, ascending.
    pub voxels: Vec<usize>,
}

impl Block {
    /// Linear index range `[first, last + 1)` owned by this block.
    ///
    /// Spans of different blocks never overlap; excluded voxels inside a span
    /// are owned (and left untouched) by the same block.
    pub fn span(&self) -> Range<usize> {
        match (self.voxels.first(), self.voxels.last()) {
            (Some(&first), Some(&last)) => first..last + 1,
            _ => 0..0,
        }
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

/// Indices inside `region` that the mask includes, ascending.
pub fn active_voxels(geometry: &Geometry, mask: Option<&Mask>, region: &Region) -> Vec<usize> {
    region
        .linear_indices(geometry)
        .filter(|&idx| mask.is_none_or(|m| m.includes(idx)))
        .collect()
}

/// Split `active` into up to `block_count` ordered, non-empty blocks.
///
/// Chunk sizes differ by at most one; fewer blocks are returned when there
/// are fewer active voxels than requested blocks.
pub fn partition(active: Vec<usize>, block_count: usize) -> Vec<Block> {
    let total = active.len();
    let count = block_count.max(1).min(total);
    if count == 0 {
        return Vec::new();
    }
    let base = total / count;
    let extra = total % count;

    let mut blocks = Vec::with_capacity(count);
    let mut rest = active.into_iter();
    for id in 0..count {
        let len = base + usize::from(id < extra);
        blocks.push(Block {
            id,
            voxels: rest.by_ref().take(len).collect(),
        });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_cover_active_set_in_order() {
        let blocks = partition((0..10).collect(), 3);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.iter().map(Block::len).collect::<Vec<_>>(), vec![4, 3, 3]);
        let flat: Vec<usize> = blocks.iter().flat_map(|b| b.voxels.clone()).collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
        assert_eq!(blocks[1].span(), 4..7);
    }

    #[test]
    fn fewer_voxels_than_blocks_drops_empty_blocks() {
        let blocks = partition(vec![3, 9], 8);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| !b.is_empty()));
        assert!(partition(Vec::new(), 4).is_empty());
    }

    #[test]
    fn spans_are_disjoint_with_masked_gaps() {
        let geometry = Geometry::new([4, 3, 1]);
        let flags: Vec<bool> = (0..12).map(|i| i % 3 != 0).collect();
        let mask = Mask::from_flags(geometry.clone(), &flags).unwrap();
        let active = active_voxels(&geometry, Some(&mask), &geometry.full_region());
        assert_eq!(active.len(), 8);

        let blocks = partition(active, 3);
        for pair in blocks.windows(2) {
            assert!(pair[0].span().end <= pair[1].span().start);
        }
    }

    #[test]
    fn region_restricts_active_set() {
        let geometry = Geometry::new([4, 4, 2]);
        let region = Region::new([1, 1, 1], [2, 2, 1]);
        let active = active_voxels(&geometry, None, &region);
        assert_eq!(active, vec![21, 22, 25, 26]);
    }
}
