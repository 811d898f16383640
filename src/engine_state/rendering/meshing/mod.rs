//! Mesh generation for terrain sections.
//!
//! Blocks are meshed face by face: a face is emitted when the neighbouring block does
//! not hide it. Quads are bucketed by render pass and by the direction they face, so
//! whole buckets can later be skipped when they face away from the camera.
//!
//! # Architecture
//! - [`ChunkBuildBuffers`]: per-thread scratch buffers, one [`ChunkModelBuilder`] per pass
//! - [`render_block`]: emits the visible faces of one block
//! - [`ChunkBuildBuffers::take_geometry`]: packs everything into one upload per section
//! - `occlusion`: the face-to-face visibility flood fill
//!
//! # Performance Considerations
//! - Scratch buffers keep their allocations between builds on the same thread
//! - A section's passes are packed into a single contiguous vertex range so it needs
//!   exactly one arena allocation

mod face;
pub mod occlusion;

pub use face::Face;
pub use occlusion::{ChunkOcclusionData, ChunkOcclusionDataBuilder};

use cgmath::{Point3, Vector3};

use super::data::{ChunkPassModel, ModelPart};
use super::{ChunkMeshFace, RenderPass, Vertex};
use crate::engine_state::voxels::block::{block_side::BlockSide, Block};
use crate::engine_state::voxels::WorldSlice;

/// Vertices per emitted quad.
pub const VERTICES_PER_QUAD: u32 = 4;

/// Quads for a single render pass, bucketed by facing.
#[derive(Debug, Default)]
pub struct ChunkModelBuilder {
    faces: [Vec<Vertex>; ChunkMeshFace::COUNT],
}

impl ChunkModelBuilder {
    pub fn add_quad(&mut self, facing: ChunkMeshFace, vertices: [Vertex; 4]) {
        self.faces[facing as usize].extend_from_slice(&vertices);
    }

    pub fn vertex_count(&self) -> usize {
        self.faces.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.iter().all(Vec::is_empty)
    }

    fn clear(&mut self) {
        for face in &mut self.faces {
            face.clear();
        }
    }
}

/// Geometry produced by one section build, ready to be uploaded.
#[derive(Debug, Default)]
pub struct BuiltChunkGeometry {
    /// Vertex bytes for every pass, or `None` if nothing was emitted
    pub vertices: Option<Vec<u8>>,
    /// Where each pass's quads live inside `vertices`
    pub models: [Option<ChunkPassModel>; RenderPass::COUNT],
}

impl BuiltChunkGeometry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices
            .as_ref()
            .map_or(0, |bytes| bytes.len() as u32 / Vertex::STRIDE)
    }
}

/// Scratch space for building one section at a time.
#[derive(Debug, Default)]
pub struct ChunkBuildBuffers {
    builders: [ChunkModelBuilder; RenderPass::COUNT],
}

impl ChunkBuildBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, pass: RenderPass) -> &mut ChunkModelBuilder {
        &mut self.builders[pass.index()]
    }

    pub fn clear(&mut self) {
        for builder in &mut self.builders {
            builder.clear();
        }
    }

    pub fn is_clear(&self) -> bool {
        self.builders.iter().all(ChunkModelBuilder::is_empty)
    }

    /// Packs every pass into one vertex buffer, passes in draw order and facings in
    /// [`ChunkMeshFace`] order, and clears the scratch buffers.
    pub fn take_geometry(&mut self) -> BuiltChunkGeometry {
        let total: usize = self.builders.iter().map(ChunkModelBuilder::vertex_count).sum();
        if total == 0 {
            return BuiltChunkGeometry::empty();
        }

        let mut bytes = Vec::with_capacity(total * Vertex::STRIDE as usize);
        let mut models: [Option<ChunkPassModel>; RenderPass::COUNT] = Default::default();
        let mut offset = 0;

        for pass in RenderPass::all() {
            let builder = &mut self.builders[pass.index()];
            if builder.is_empty() {
                continue;
            }

            let mut parts = [None; ChunkMeshFace::COUNT];
            for facing in ChunkMeshFace::all() {
                let vertices = &mut builder.faces[facing as usize];
                if vertices.is_empty() {
                    continue;
                }

                let length = vertices.len() as u32;
                parts[facing as usize] = Some(ModelPart { offset, length });
                bytes.extend_from_slice(bytemuck::cast_slice(vertices));

                offset += length;
                vertices.clear();
            }

            models[pass.index()] = Some(ChunkPassModel::new(parts));
        }

        BuiltChunkGeometry {
            vertices: Some(bytes),
            models,
        }
    }
}

/// Emits the faces of `block` that are not hidden by a neighbour.
///
/// # Arguments
/// * `slice` - Neighbourhood snapshot the block belongs to
/// * `position` - Local position of the block within the slice's centre section
/// * `origin` - Offset of the section inside its region, in blocks
/// * `buffers` - Destination buffers
///
/// # Returns
/// `true` if at least one face was emitted.
pub fn render_block(
    slice: &WorldSlice,
    position: Point3<i32>,
    block: Block,
    origin: Vector3<i32>,
    buffers: &mut ChunkBuildBuffers,
) -> bool {
    let Some(pass) = block.get_type().render_pass() else {
        return false;
    };

    let mut emitted = false;

    for side in BlockSide::all() {
        let adjacent = position + side.offset();
        let neighbor = slice.get_block(adjacent.x, adjacent.y, adjacent.z);

        if !should_draw_side(block, neighbor, pass) {
            continue;
        }

        let face = Face::new(
            position.x,
            position.y,
            position.z,
            block.block_type as usize,
            side,
        );

        buffers
            .get(pass)
            .add_quad(ChunkMeshFace::from_side(side), face.to_vertices(origin));
        emitted = true;
    }

    emitted
}

/// Opaque neighbours hide a face, as do identical translucent neighbours so the inside
/// of a body of water or a glass pane is not drawn.
fn should_draw_side(block: Block, neighbor: Block, pass: RenderPass) -> bool {
    if neighbor.is_opaque() {
        return false;
    }

    !(pass.is_translucent() && neighbor.block_type == block.block_type)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;
    use crate::engine_state::voxels::chunk::ChunkSection;
    use crate::engine_state::voxels::WorldView;

    struct SingleSection(Arc<ChunkSection>);

    impl WorldView for SingleSection {
        fn get_section(&self, position: Point3<i32>) -> Option<Arc<ChunkSection>> {
            (position == self.0.position).then(|| self.0.clone())
        }

        fn min_section_y(&self) -> i32 {
            0
        }

        fn max_section_y(&self) -> i32 {
            1
        }

        fn is_column_loaded(&self, x: i32, z: i32) -> bool {
            x == 0 && z == 0
        }
    }

    fn slice_with(blocks: &[(usize, usize, usize, BlockType)]) -> WorldSlice {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        for &(x, y, z, block_type) in blocks {
            section.set_block(x, y, z, Block::new(block_type));
        }

        WorldSlice::prepare(&SingleSection(Arc::new(section)), Point3::new(0, 0, 0))
            .expect("section is not empty")
    }

    #[test]
    fn isolated_block_emits_six_faces() {
        let slice = slice_with(&[(4, 4, 4, BlockType::DIRT)]);
        let mut buffers = ChunkBuildBuffers::new();

        assert!(render_block(
            &slice,
            Point3::new(4, 4, 4),
            Block::new(BlockType::DIRT),
            Vector3::new(0, 0, 0),
            &mut buffers
        ));
        assert_eq!(buffers.get(RenderPass::SOLID).vertex_count(), 24);
    }

    #[test]
    fn touching_opaque_blocks_hide_shared_faces() {
        let slice = slice_with(&[(4, 4, 4, BlockType::DIRT), (5, 4, 4, BlockType::DIRT)]);
        let mut buffers = ChunkBuildBuffers::new();

        for x in [4, 5] {
            render_block(
                &slice,
                Point3::new(x, 4, 4),
                Block::new(BlockType::DIRT),
                Vector3::new(0, 0, 0),
                &mut buffers,
            );
        }

        assert_eq!(buffers.get(RenderPass::SOLID).vertex_count(), 10 * 4);
    }

    #[test]
    fn water_next_to_water_is_culled_but_not_next_to_glass() {
        let slice = slice_with(&[
            (4, 4, 4, BlockType::WATER),
            (5, 4, 4, BlockType::WATER),
            (4, 5, 4, BlockType::GLASS),
        ]);
        let mut buffers = ChunkBuildBuffers::new();

        render_block(
            &slice,
            Point3::new(4, 4, 4),
            Block::new(BlockType::WATER),
            Vector3::new(0, 0, 0),
            &mut buffers,
        );

        assert_eq!(buffers.get(RenderPass::TRANSLUCENT).vertex_count(), 5 * 4);
    }

    #[test]
    fn packed_geometry_places_passes_back_to_back() {
        let slice = slice_with(&[(1, 1, 1, BlockType::DIRT), (8, 8, 8, BlockType::LEAVES)]);
        let mut buffers = ChunkBuildBuffers::new();

        render_block(&slice, Point3::new(1, 1, 1), Block::new(BlockType::DIRT), Vector3::new(0, 0, 0), &mut buffers);
        render_block(&slice, Point3::new(8, 8, 8), Block::new(BlockType::LEAVES), Vector3::new(0, 0, 0), &mut buffers);

        let geometry = buffers.take_geometry();
        assert!(buffers.is_clear());
        assert_eq!(geometry.vertex_count(), 48);

        let solid = geometry.models[RenderPass::SOLID.index()].as_ref().unwrap();
        let cutout = geometry.models[RenderPass::CUTOUT.index()].as_ref().unwrap();

        assert_eq!(solid.visibility_bits().count_ones(), 6);
        assert_eq!(solid.part(ChunkMeshFace::UP).map(|p| p.offset), Some(0));
        assert_eq!(cutout.part(ChunkMeshFace::UP).map(|p| p.offset), Some(24));
        assert!(geometry.models[RenderPass::TRANSLUCENT.index()].is_none());
    }

    #[test]
    fn air_emits_nothing() {
        let slice = slice_with(&[(0, 0, 0, BlockType::DIRT)]);
        let mut buffers = ChunkBuildBuffers::new();

        assert!(!render_block(&slice, Point3::new(3, 3, 3), Block::AIR, Vector3::new(0, 0, 0), &mut buffers));
        assert!(buffers.take_geometry().vertices.is_none());
    }
}
