//! Terrain rendering core.
//!
//! This module turns loaded chunk sections into uploaded geometry and decides, every
//! frame, which of them should be drawn.
//!
//! ## Architecture
//!
//! - `section`: [`RenderSection`] nodes, their neighbour links and per-frame graph state
//! - `region`: [`RenderRegion`]s grouping 8x4x8 sections into one vertex arena
//! - `meshing` and `tasks`: off-thread geometry builds producing [`TerrainBuildResult`]s
//! - `section_manager`: the [`RenderSectionManager`] running visibility, scheduling and uploads
//! - `lists` and `backend`: the sorted draw lists handed to a [`MeshBackend`]
//!
//! ## Performance Considerations
//! - Visibility is a breadth-first walk over loaded sections, stamped with a frame
//!   counter so no per-frame reset is needed
//! - Whole regions are frustum tested once, sections only when their region straddles
//!   a frustum plane
//! - All sections in a region share one buffer, so a region costs one bind per pass

pub mod backend;
pub mod data;
pub mod lists;
pub mod meshing;
pub mod region;
pub mod section;
pub mod section_manager;
pub mod tasks;
mod vertex;

pub use backend::{DrawCommand, DrawCommandRecorder, MeshBackend};
pub use data::{BlockEntity, ChunkPassModel, ChunkRenderBounds, ChunkRenderData};
pub use lists::{ChunkRenderList, SortedChunkLists, SortedTerrainLists};
pub use region::{RenderRegion, RenderRegionManager};
pub use section::{ChunkUpdateType, RenderSection, SectionId};
pub use section_manager::RenderSectionManager;
pub use tasks::TerrainBuildResult;
pub use vertex::Vertex;

use super::voxels::block::block_side::BlockSide;

/// The passes terrain geometry is split into, in draw order.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderPass {
    /// Fully opaque geometry
    SOLID = 0,
    /// Opaque geometry with alpha-tested holes
    CUTOUT = 1,
    /// Blended geometry, drawn back to front
    TRANSLUCENT = 2,
}

impl RenderPass {
    pub const COUNT: usize = 3;

    pub const fn all() -> [RenderPass; Self::COUNT] {
        [RenderPass::SOLID, RenderPass::CUTOUT, RenderPass::TRANSLUCENT]
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Translucent passes are drawn in reverse order so nearer geometry blends over
    /// farther geometry.
    pub const fn is_translucent(self) -> bool {
        matches!(self, RenderPass::TRANSLUCENT)
    }
}

/// The direction a group of quads faces, used to skip whole groups that face away
/// from the camera.
///
/// The order is: [UP, DOWN, EAST, WEST, SOUTH, NORTH, UNASSIGNED]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkMeshFace {
    UP = 0,
    DOWN = 1,
    EAST = 2,
    WEST = 3,
    SOUTH = 4,
    NORTH = 5,
    /// Quads not aligned to any axis
    UNASSIGNED = 6,
}

impl ChunkMeshFace {
    pub const COUNT: usize = 7;

    pub const UNASSIGNED_BITS: u32 = 1 << ChunkMeshFace::UNASSIGNED as u32;
    pub const ALL_BITS: u32 = (1 << Self::COUNT) - 1;

    pub const fn all() -> [ChunkMeshFace; Self::COUNT] {
        [
            ChunkMeshFace::UP,
            ChunkMeshFace::DOWN,
            ChunkMeshFace::EAST,
            ChunkMeshFace::WEST,
            ChunkMeshFace::SOUTH,
            ChunkMeshFace::NORTH,
            ChunkMeshFace::UNASSIGNED,
        ]
    }

    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn from_side(side: BlockSide) -> ChunkMeshFace {
        match side {
            BlockSide::TOP => ChunkMeshFace::UP,
            BlockSide::BOTTOM => ChunkMeshFace::DOWN,
            BlockSide::EAST => ChunkMeshFace::EAST,
            BlockSide::WEST => ChunkMeshFace::WEST,
            BlockSide::SOUTH => ChunkMeshFace::SOUTH,
            BlockSide::NORTH => ChunkMeshFace::NORTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_side_maps_to_a_distinct_face() {
        let mut bits = 0;
        for side in BlockSide::all() {
            bits |= ChunkMeshFace::from_side(side).bit();
        }

        assert_eq!(bits | ChunkMeshFace::UNASSIGNED_BITS, ChunkMeshFace::ALL_BITS);
        assert_eq!(bits.count_ones(), 6);
    }

    #[test]
    fn only_translucent_pass_is_reversed() {
        let reversed: Vec<_> = RenderPass::all()
            .into_iter()
            .filter(|pass| pass.is_translucent())
            .collect();
        assert_eq!(reversed, vec![RenderPass::TRANSLUCENT]);
    }
}
