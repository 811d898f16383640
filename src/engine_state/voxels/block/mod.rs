//! # Block Module
//!
//! This module provides the core block-related functionality for the terrain core.
//! It includes block type definitions, block face handling, and block data structures.

use block_type::BlockType;

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block types in memory.
/// This is used for efficient storage and serialization of block data.
pub type BlockTypeSize = u8;

/// Maps each block type to its corresponding texture indices for each face.
///
/// The outer array is indexed by `BlockType` as a `usize`.
/// The inner array contains 6 texture indices, one for each face in `BlockSide` order:
/// [Bottom, Top, North, South, West, East]
pub static BLOCK_TYPE_TO_TEXTURE_INDICES: [[usize; 6]; 9] = [
    [0, 0, 0, 0, 0, 0], // AIR (never meshed)
    [1, 1, 1, 1, 1, 1], // DIRT
    [1, 3, 2, 2, 2, 2], // GRASS (bottom: dirt, top: grass, sides: grass on dirt)
    [0, 0, 0, 0, 0, 0], // WOOD
    [4, 4, 4, 4, 4, 4], // WHITE
    [5, 5, 5, 5, 5, 5], // LEAVES
    [6, 6, 6, 6, 6, 6], // GLASS
    [7, 7, 7, 7, 7, 7], // WATER
    [8, 8, 8, 8, 8, 8], // CHEST
];

/// Represents a single voxel block in the world.
///
/// This is a lightweight structure that stores only the essential block data.
/// The actual block properties are looked up from the block type.
///
/// # Memory Layout
/// The `#[repr(C)]` attribute ensures a consistent memory layout.
/// The block type is stored as a compact `BlockTypeSize` for memory efficiency.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq, Eq, Default)]
pub struct Block {
    /// The type of this block, encoded as a `BlockTypeSize` for compact storage.
    pub block_type: BlockTypeSize,
}

impl Block {
    pub const AIR: Block = Block { block_type: 0 };

    /// Creates a new block of the specified type.
    ///
    /// # Arguments
    /// * `block_type` - The type of block to create
    ///
    /// # Returns
    /// A new `Block` instance with the specified type.
    pub fn new(block_type: BlockType) -> Self {
        Block {
            block_type: block_type as BlockTypeSize,
        }
    }

    pub fn get_type(&self) -> BlockType {
        BlockType::get_block_type_from_int(self.block_type)
    }

    pub fn is_air(&self) -> bool {
        self.block_type == BlockType::AIR as BlockTypeSize
    }

    pub fn is_opaque(&self) -> bool {
        self.get_type().is_opaque()
    }

    /// Gets the texture indices for all faces of a block given its type as an integer.
    ///
    /// # Arguments
    /// * `btype_int` - The block type as a `BlockTypeSize`
    ///
    /// # Returns
    /// An array of 6 texture indices, one for each face of the block.
    pub fn get_texture_indices_from_int(btype_int: BlockTypeSize) -> [usize; 6] {
        let block_type = BlockType::get_block_type_from_int(btype_int);
        BLOCK_TYPE_TO_TEXTURE_INDICES[block_type as usize]
    }
}

impl From<BlockType> for Block {
    fn from(block_type: BlockType) -> Self {
        Block::new(block_type)
    }
}
