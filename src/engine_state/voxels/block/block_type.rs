//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world and the
//! properties the mesher and the visibility graph need from them.

use num_derive::FromPrimitive;

use super::BlockTypeSize;
use crate::engine_state::rendering::RenderPass;

/// Enumerates all possible block types in the voxel world.
///
/// The `FromPrimitive` derive allows conversion from the compact storage integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BlockType {
    /// An air block, which is non-solid and transparent.
    AIR,

    /// A basic dirt block.
    DIRT,

    /// A grass block with different textures on top and sides.
    GRASS,

    /// A wooden block with a bark texture on all sides.
    WOOD,

    /// A plain white block, often used for testing.
    WHITE,

    /// Foliage with alpha-tested holes.
    LEAVES,

    /// Blended, see-through glass.
    GLASS,

    /// Blended water with an animated texture.
    WATER,

    /// A container drawn by its block entity instead of the terrain mesh.
    CHEST,
}

impl BlockType {
    /// Converts a `BlockTypeSize` to a `BlockType`.
    ///
    /// Unknown values decode as `AIR`.
    ///
    /// # Arguments
    /// * `btype` - The block type as a `BlockTypeSize`
    pub fn get_block_type_from_int(btype: BlockTypeSize) -> Self {
        num::FromPrimitive::from_u8(btype).unwrap_or(BlockType::AIR)
    }

    /// Generates a random solid terrain block type.
    pub fn get_random_type() -> Self {
        num::FromPrimitive::from_u8(fastrand::u8(1..5)).unwrap_or(BlockType::DIRT)
    }

    /// Whether the block fills its cell and hides whatever is behind it.
    pub fn is_opaque(self) -> bool {
        matches!(
            self,
            BlockType::DIRT | BlockType::GRASS | BlockType::WOOD | BlockType::WHITE
        )
    }

    /// The pass the block's faces are drawn in, or `None` if the terrain mesher emits
    /// no geometry for it.
    pub fn render_pass(self) -> Option<RenderPass> {
        match self {
            BlockType::AIR | BlockType::CHEST => None,
            BlockType::LEAVES => Some(RenderPass::CUTOUT),
            BlockType::GLASS | BlockType::WATER => Some(RenderPass::TRANSLUCENT),
            _ => Some(RenderPass::SOLID),
        }
    }

    /// Whether the block uses an animated sprite that needs ticking while visible.
    pub fn is_animated(self) -> bool {
        self == BlockType::WATER
    }

    /// Whether the block is drawn by a block entity renderer.
    pub fn has_block_entity(self) -> bool {
        self == BlockType::CHEST
    }
}
