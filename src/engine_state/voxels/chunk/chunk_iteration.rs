//! # Chunk Iteration Module
//!
//! Iteration over the present (non-air) blocks of a section. The iterator walks the set
//! bits of the section's `non_air` mask, so runs of air are skipped a word at a time.

use bitvec::slice::IterOnes;
use cgmath::Point3;

use crate::engine_state::voxels::block::Block;

use super::ChunkSection;

/// An iterator over all non-air blocks in a section, yielding local positions.
pub struct ChunkBlockIterator<'a> {
    section: &'a ChunkSection,
    ones: IterOnes<'a, usize, bitvec::order::Lsb0>,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Creates a new `ChunkBlockIterator` for the given section.
    pub fn new(section: &'a ChunkSection) -> Self {
        Self {
            section,
            ones: section.non_air_mask().iter_ones(),
        }
    }
}

impl Iterator for ChunkBlockIterator<'_> {
    type Item = (Point3<usize>, Block);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.ones.next()?;
        Some((
            ChunkSection::position_of(index),
            self.section.block_at_index(index),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn only_present_blocks_are_visited() {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        section.set_block(15, 0, 0, Block::new(BlockType::WOOD));
        section.set_block(0, 15, 15, Block::new(BlockType::WATER));

        let visited: Vec<_> = section.iter_blocks().collect();

        assert_eq!(
            visited,
            vec![
                (Point3::new(15, 0, 0), Block::new(BlockType::WOOD)),
                (Point3::new(0, 15, 15), Block::new(BlockType::WATER)),
            ]
        );
    }
}
