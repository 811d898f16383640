//! # Chunk Module
//!
//! This module provides the `ChunkSection` struct which stores one 16x16x16 cube of
//! blocks, the unit the terrain is built and drawn in, plus the noise generator that
//! fills sections for the demo world.
//!
//! ## Memory Layout
//!
//! Blocks are stored densely (one byte each) in x, then y, then z order. Two bit vectors
//! mirror the block array:
//! - `non_air`: one bit per block that is not air, so empty sections and the iteration
//!   over present blocks never touch the block array
//! - `opaque`: one bit per opaque block, used for face culling and occlusion flood fill
//!
//! ### Performance Characteristics
//! - **Block Lookup**: O(1)
//! - **Opacity Check**: O(1), one bit
//! - **Emptiness Check**: O(n / 64) over the `non_air` words

use bitvec::prelude::BitVec;
use cgmath::Point3;

use super::block::{block_type::BlockType, Block};

pub mod chunk_creation;
pub mod chunk_iteration;

pub use chunk_creation::ChunkGenerator;
pub use chunk_iteration::ChunkBlockIterator;

/// The dimension (width, height, depth) of a chunk section in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a section (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a section (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// A 16x16x16 collection of voxel blocks.
#[derive(Clone, Debug)]
pub struct ChunkSection {
    /// The position of this section in section coordinates (not block coordinates).
    pub position: Point3<i32>,
    blocks: Vec<Block>,
    non_air: BitVec,
    opaque: BitVec,
}

impl ChunkSection {
    /// Creates a section filled with air.
    pub fn empty(position: Point3<i32>) -> Self {
        ChunkSection {
            position,
            blocks: vec![Block::AIR; CHUNK_SIZE as usize],
            non_air: BitVec::repeat(false, CHUNK_SIZE as usize),
            opaque: BitVec::repeat(false, CHUNK_SIZE as usize),
        }
    }

    /// Creates a section completely filled with `block_type`.
    pub fn filled(position: Point3<i32>, block_type: BlockType) -> Self {
        let mut section = Self::empty(position);
        for index in 0..CHUNK_SIZE as usize {
            section.set_index(index, Block::new(block_type));
        }
        section
    }

    /// Returns the flat index of a local block position.
    ///
    /// # Panics
    /// Panics in debug builds if the position is outside the section.
    pub fn index_of(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(
            x < CHUNK_DIMENSION as usize && y < CHUNK_DIMENSION as usize && z < CHUNK_DIMENSION as usize,
            "Local position ({}, {}, {}) is outside the section",
            x,
            y,
            z
        );
        x + CHUNK_DIMENSION as usize * y + CHUNK_PLANE_SIZE as usize * z
    }

    /// Inverse of [`ChunkSection::index_of`].
    pub fn position_of(index: usize) -> Point3<usize> {
        let dim = CHUNK_DIMENSION as usize;
        Point3::new(index % dim, (index / dim) % dim, index / (dim * dim))
    }

    pub fn get_block(&self, x: usize, y: usize, z: usize) -> Block {
        self.blocks[Self::index_of(x, y, z)]
    }

    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: Block) {
        self.set_index(Self::index_of(x, y, z), block);
    }

    pub fn is_block_opaque(&self, x: usize, y: usize, z: usize) -> bool {
        self.opaque[Self::index_of(x, y, z)]
    }

    /// Whether every block in the section is air.
    pub fn is_empty(&self) -> bool {
        self.non_air.not_any()
    }

    /// Number of blocks that are not air.
    pub fn block_count(&self) -> usize {
        self.non_air.count_ones()
    }

    /// Iterates over every block that is not air, in index order.
    pub fn iter_blocks(&self) -> ChunkBlockIterator<'_> {
        ChunkBlockIterator::new(self)
    }

    pub fn opacity_mask(&self) -> &BitVec {
        &self.opaque
    }

    pub(crate) fn non_air_mask(&self) -> &BitVec {
        &self.non_air
    }

    pub(crate) fn block_at_index(&self, index: usize) -> Block {
        self.blocks[index]
    }

    fn set_index(&mut self, index: usize, block: Block) {
        self.blocks[index] = block;
        self.non_air.set(index, !block.is_air());
        self.opaque.set(index, block.is_opaque());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_follow_block_changes() {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        assert!(section.is_empty());

        section.set_block(1, 2, 3, Block::new(BlockType::DIRT));
        section.set_block(4, 5, 6, Block::new(BlockType::GLASS));

        assert!(!section.is_empty());
        assert_eq!(section.block_count(), 2);
        assert!(section.is_block_opaque(1, 2, 3));
        assert!(!section.is_block_opaque(4, 5, 6));

        section.set_block(1, 2, 3, Block::AIR);
        assert_eq!(section.block_count(), 1);
        assert!(!section.is_block_opaque(1, 2, 3));
    }

    #[test]
    fn index_round_trips_through_position() {
        let index = ChunkSection::index_of(3, 7, 11);
        assert_eq!(ChunkSection::position_of(index), Point3::new(3, 7, 11));
    }
}
