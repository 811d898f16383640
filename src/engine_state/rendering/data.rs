//! Results of a section build that live on the render thread.
//!
//! [`ChunkRenderData`] is immutable once built and shared through `Arc`, so the two
//! sentinels [`ChunkRenderData::absent`] and [`ChunkRenderData::empty`] are handed out
//! without allocating.

use std::sync::{Arc, OnceLock};

use cgmath::Point3;

use super::meshing::ChunkOcclusionData;
use super::{ChunkMeshFace, RenderPass};
use crate::engine_state::voxels::block::block_type::BlockType;
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;

/// Set when a section has geometry in at least one pass.
pub const HAS_BLOCK_GEOMETRY: u32 = 1 << 0;
/// Set when a section contains block entities.
pub const HAS_BLOCK_ENTITIES: u32 = 1 << 1;

/// A run of vertices inside a section's uploaded geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelPart {
    /// First vertex, relative to the start of the section's geometry
    pub offset: u32,
    pub length: u32,
}

/// The quads of one render pass, split by facing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPassModel {
    parts: [Option<ModelPart>; ChunkMeshFace::COUNT],
    visibility_bits: u32,
}

impl ChunkPassModel {
    pub fn new(parts: [Option<ModelPart>; ChunkMeshFace::COUNT]) -> Self {
        let visibility_bits = ChunkMeshFace::all()
            .into_iter()
            .filter(|facing| parts[*facing as usize].is_some())
            .fold(0, |bits, facing| bits | facing.bit());

        Self {
            parts,
            visibility_bits,
        }
    }

    /// One bit per [`ChunkMeshFace`] that has quads.
    pub fn visibility_bits(&self) -> u32 {
        self.visibility_bits
    }

    pub fn part(&self, facing: ChunkMeshFace) -> Option<ModelPart> {
        self.parts[facing as usize]
    }

    pub fn model_part_segments(&self) -> &[Option<ModelPart>; ChunkMeshFace::COUNT] {
        &self.parts
    }
}

/// World-space bounding box of a section's geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkRenderBounds {
    pub x1: f32,
    pub y1: f32,
    pub z1: f32,
    pub x2: f32,
    pub y2: f32,
    pub z2: f32,
}

impl ChunkRenderBounds {
    /// An inverted box that fails every containment test.
    pub const ALWAYS_FALSE: ChunkRenderBounds = ChunkRenderBounds {
        x1: f32::INFINITY,
        y1: f32::INFINITY,
        z1: f32::INFINITY,
        x2: f32::NEG_INFINITY,
        y2: f32::NEG_INFINITY,
        z2: f32::NEG_INFINITY,
    };

    /// The full volume of the section at `position`.
    pub fn for_section(position: Point3<i32>) -> Self {
        let dim = CHUNK_DIMENSION as f32;
        let (x, y, z) = (
            position.x as f32 * dim,
            position.y as f32 * dim,
            position.z as f32 * dim,
        );

        Self {
            x1: x,
            y1: y,
            z1: z,
            x2: x + dim,
            y2: y + dim,
            z2: z + dim,
        }
    }
}

/// Accumulates the bounds of emitted blocks, per axis in block resolution.
#[derive(Clone, Copy, Debug)]
pub struct ChunkRenderBoundsBuilder {
    min: [i32; 3],
    max: [i32; 3],
}

impl Default for ChunkRenderBoundsBuilder {
    fn default() -> Self {
        Self {
            min: [i32::MAX; 3],
            max: [i32::MIN; 3],
        }
    }
}

impl ChunkRenderBoundsBuilder {
    pub fn add_block(&mut self, x: i32, y: i32, z: i32) {
        for (axis, value) in [x, y, z].into_iter().enumerate() {
            self.min[axis] = self.min[axis].min(value);
            self.max[axis] = self.max[axis].max(value + 1);
        }
    }

    /// Bounds in world space for a section at `position`; empty builders cover the
    /// whole section.
    pub fn build(&self, position: Point3<i32>) -> ChunkRenderBounds {
        if self.min[0] > self.max[0] {
            return ChunkRenderBounds::for_section(position);
        }

        let origin = [
            position.x * CHUNK_DIMENSION,
            position.y * CHUNK_DIMENSION,
            position.z * CHUNK_DIMENSION,
        ];

        ChunkRenderBounds {
            x1: (origin[0] + self.min[0]) as f32,
            y1: (origin[1] + self.min[1]) as f32,
            z1: (origin[2] + self.min[2]) as f32,
            x2: (origin[0] + self.max[0]) as f32,
            y2: (origin[1] + self.max[1]) as f32,
            z2: (origin[2] + self.max[2]) as f32,
        }
    }
}

/// A block with extra per-instance state, drawn by the host rather than meshed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockEntity {
    pub position: Point3<i32>,
    pub block_type: BlockType,
}

/// Everything known about a built section besides its uploaded vertices.
#[derive(Debug)]
pub struct ChunkRenderData {
    models: [Option<ChunkPassModel>; RenderPass::COUNT],
    block_entities: Vec<BlockEntity>,
    global_block_entities: Vec<BlockEntity>,
    occlusion: Option<ChunkOcclusionData>,
    bounds: ChunkRenderBounds,
    animated: bool,
}

static ABSENT: OnceLock<Arc<ChunkRenderData>> = OnceLock::new();
static EMPTY: OnceLock<Arc<ChunkRenderData>> = OnceLock::new();

impl ChunkRenderData {
    /// Data of a section that has never been built.
    pub fn absent() -> Arc<ChunkRenderData> {
        ABSENT
            .get_or_init(|| Arc::new(ChunkRenderDataBuilder::new().build()))
            .clone()
    }

    /// Data of a section without any geometry, open on all faces.
    pub fn empty() -> Arc<ChunkRenderData> {
        EMPTY
            .get_or_init(|| {
                let mut builder = ChunkRenderDataBuilder::new();
                builder.set_occlusion_data(ChunkOcclusionData::all_open());
                Arc::new(builder.build())
            })
            .clone()
    }

    pub fn model(&self, pass: RenderPass) -> Option<&ChunkPassModel> {
        self.models[pass.index()].as_ref()
    }

    /// Block entities culled with the section.
    pub fn block_entities(&self) -> &[BlockEntity] {
        &self.block_entities
    }

    /// Block entities that must be drawn even when the section is not visible.
    pub fn global_block_entities(&self) -> &[BlockEntity] {
        &self.global_block_entities
    }

    /// `None` for never-built sections, which are treated as fully open.
    pub fn occlusion_data(&self) -> Option<&ChunkOcclusionData> {
        self.occlusion.as_ref()
    }

    pub fn bounds(&self) -> &ChunkRenderBounds {
        &self.bounds
    }

    /// Whether the section contains animated textures and must be ticked while visible.
    pub fn is_tickable(&self) -> bool {
        self.animated
    }

    pub fn flags(&self) -> u32 {
        let mut flags = 0;

        if self.models.iter().any(Option::is_some) {
            flags |= HAS_BLOCK_GEOMETRY;
        }

        if !self.block_entities.is_empty() || !self.global_block_entities.is_empty() {
            flags |= HAS_BLOCK_ENTITIES;
        }

        flags
    }

    /// Nothing to draw and nothing to tick.
    pub fn is_empty(&self) -> bool {
        self.flags() == 0 && !self.animated
    }
}

#[derive(Default)]
pub struct ChunkRenderDataBuilder {
    models: [Option<ChunkPassModel>; RenderPass::COUNT],
    block_entities: Vec<BlockEntity>,
    global_block_entities: Vec<BlockEntity>,
    occlusion: Option<ChunkOcclusionData>,
    bounds: Option<ChunkRenderBounds>,
    animated: bool,
}

impl ChunkRenderDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_models(&mut self, models: [Option<ChunkPassModel>; RenderPass::COUNT]) {
        self.models = models;
    }

    pub fn set_bounds(&mut self, bounds: ChunkRenderBounds) {
        self.bounds = Some(bounds);
    }

    pub fn set_occlusion_data(&mut self, data: ChunkOcclusionData) {
        self.occlusion = Some(data);
    }

    pub fn mark_animated(&mut self) {
        self.animated = true;
    }

    /// Adds a block entity; `cull` is false for entities that render outside the
    /// section's volume.
    pub fn add_block_entity(&mut self, entity: BlockEntity, cull: bool) {
        if cull {
            self.block_entities.push(entity);
        } else {
            self.global_block_entities.push(entity);
        }
    }

    pub fn build(self) -> ChunkRenderData {
        ChunkRenderData {
            models: self.models,
            block_entities: self.block_entities,
            global_block_entities: self.global_block_entities,
            occlusion: self.occlusion,
            bounds: self.bounds.unwrap_or(ChunkRenderBounds::ALWAYS_FALSE),
            animated: self.animated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_side::BlockSide;

    #[test]
    fn sentinels_are_shared() {
        assert!(Arc::ptr_eq(&ChunkRenderData::empty(), &ChunkRenderData::empty()));
        assert!(!Arc::ptr_eq(&ChunkRenderData::empty(), &ChunkRenderData::absent()));
    }

    #[test]
    fn empty_is_open_and_absent_has_no_occlusion() {
        let empty = ChunkRenderData::empty();
        let occlusion = empty.occlusion_data().unwrap();
        assert!(occlusion.is_visible_through(BlockSide::TOP, BlockSide::BOTTOM));
        assert!(empty.is_empty());

        assert!(ChunkRenderData::absent().occlusion_data().is_none());
    }

    #[test]
    fn flags_reflect_contents() {
        let mut builder = ChunkRenderDataBuilder::new();
        builder.add_block_entity(
            BlockEntity {
                position: Point3::new(1, 2, 3),
                block_type: BlockType::CHEST,
            },
            false,
        );
        let data = builder.build();

        assert_eq!(data.flags(), HAS_BLOCK_ENTITIES);
        assert_eq!(data.global_block_entities().len(), 1);
        assert!(data.block_entities().is_empty());

        let mut parts = [None; ChunkMeshFace::COUNT];
        parts[ChunkMeshFace::UP as usize] = Some(ModelPart { offset: 0, length: 4 });
        let mut builder = ChunkRenderDataBuilder::new();
        builder.set_models([Some(ChunkPassModel::new(parts)), None, None]);

        assert_eq!(builder.build().flags(), HAS_BLOCK_GEOMETRY);
    }

    #[test]
    fn bounds_cover_emitted_blocks() {
        let mut builder = ChunkRenderBoundsBuilder::default();
        builder.add_block(2, 0, 5);
        builder.add_block(3, 7, 5);

        let bounds = builder.build(Point3::new(1, 0, -1));
        assert_eq!((bounds.x1, bounds.x2), (18.0, 20.0));
        assert_eq!((bounds.y1, bounds.y2), (0.0, 8.0));
        assert_eq!((bounds.z1, bounds.z2), (-11.0, -10.0));
    }
}
