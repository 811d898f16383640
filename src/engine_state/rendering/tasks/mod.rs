//! Background build tasks for terrain sections.
//!
//! Tasks are created on the main thread with everything they need already captured
//! (a [`WorldSlice`] snapshot of the section and its neighbours) and executed on the
//! [`ChunkBuilder`](crate::engine_state::task_management::ChunkBuilder) worker threads.
//! Their output is handed back to the main thread for upload.
//!
//! # Available Tasks
//! - [`TerrainBuildTask`]: meshes a non-empty section
//! - [`EmptyTerrainBuildTask`]: the result for a section with nothing to draw

use std::sync::Arc;

use cgmath::{EuclideanSpace, Point3, Vector3};

use super::data::{BlockEntity, ChunkRenderBoundsBuilder, ChunkRenderData, ChunkRenderDataBuilder};
use super::meshing::{render_block, BuiltChunkGeometry, ChunkOcclusionDataBuilder};
use super::section::SectionId;
use crate::engine_state::task_management::task::{BuildContext, CancellationToken, ChunkBuilderTask};
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
use crate::engine_state::voxels::WorldSlice;

/// The output of a section build, waiting on the main thread to be uploaded.
pub struct TerrainBuildResult {
    /// The section the build was scheduled for
    pub section: SectionId,
    /// Everything known about the section besides its vertices
    pub data: Arc<ChunkRenderData>,
    /// Vertices to upload into the section's region
    pub geometry: BuiltChunkGeometry,
    /// Submission counter of the build, increasing with every task the section manager
    /// schedules; results not newer than the last accepted one are dropped
    pub build_time: i32,
}

/// A task that meshes one section in a background thread.
///
/// This task is responsible for:
/// 1. Emitting the visible faces of every block, bucketed by pass and facing
/// 2. Collecting bounds, block entities and animated blocks
/// 3. Computing which faces of the section can see each other
pub struct TerrainBuildTask {
    /// The section being rebuilt
    section: SectionId,
    /// Snapshot of the section and its 26 neighbours
    slice: WorldSlice,
    /// Offset of the section inside its region, in blocks
    origin: Vector3<i32>,
    build_time: i32,
}

impl TerrainBuildTask {
    /// Creates a new build task.
    ///
    /// # Arguments
    /// * `section` - The section the result belongs to
    /// * `slice` - Snapshot taken on the main thread
    /// * `origin` - Offset of the section inside its region, in blocks
    /// * `build_time` - Submission counter value assigned when the build was scheduled
    pub fn new(section: SectionId, slice: WorldSlice, origin: Vector3<i32>, build_time: i32) -> Self {
        Self {
            section,
            slice,
            origin,
            build_time,
        }
    }
}

impl ChunkBuilderTask for TerrainBuildTask {
    type Output = TerrainBuildResult;

    fn execute(
        &self,
        context: &mut BuildContext,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<Option<TerrainBuildResult>> {
        let section = self.slice.section();
        let position = self.slice.position();
        let origin = Point3::new(
            position.x * CHUNK_DIMENSION,
            position.y * CHUNK_DIMENSION,
            position.z * CHUNK_DIMENSION,
        );

        let mut render_data = ChunkRenderDataBuilder::new();
        let mut bounds = ChunkRenderBoundsBuilder::default();

        for y in 0..CHUNK_DIMENSION {
            if cancellation.is_cancelled() {
                return Ok(None);
            }

            for z in 0..CHUNK_DIMENSION {
                for x in 0..CHUNK_DIMENSION {
                    let block = section.get_block(x as usize, y as usize, z as usize);
                    if block.is_air() {
                        continue;
                    }

                    let block_type = block.get_type();
                    let local = Point3::new(x, y, z);

                    if render_block(&self.slice, local, block, self.origin, &mut context.buffers) {
                        bounds.add_block(x, y, z);
                    }

                    if block_type.is_animated() {
                        render_data.mark_animated();
                    }

                    if block_type.has_block_entity() {
                        render_data.add_block_entity(
                            BlockEntity {
                                position: origin + local.to_vec(),
                                block_type,
                            },
                            true,
                        );
                    }
                }
            }
        }

        let geometry = context.buffers.take_geometry();

        render_data.set_models(geometry.models.clone());
        render_data.set_bounds(bounds.build(position));
        render_data.set_occlusion_data(ChunkOcclusionDataBuilder::new(section).build());

        Ok(Some(TerrainBuildResult {
            section: self.section,
            data: Arc::new(render_data.build()),
            geometry,
            build_time: self.build_time,
        }))
    }
}

/// The build of a section that has no blocks: always [`ChunkRenderData::empty`].
pub struct EmptyTerrainBuildTask {
    section: SectionId,
    build_time: i32,
}

impl EmptyTerrainBuildTask {
    pub fn new(section: SectionId, build_time: i32) -> Self {
        Self { section, build_time }
    }
}

impl ChunkBuilderTask for EmptyTerrainBuildTask {
    type Output = TerrainBuildResult;

    fn execute(
        &self,
        _context: &mut BuildContext,
        _cancellation: &CancellationToken,
    ) -> anyhow::Result<Option<TerrainBuildResult>> {
        Ok(Some(TerrainBuildResult {
            section: self.section,
            data: ChunkRenderData::empty(),
            geometry: BuiltChunkGeometry::empty(),
            build_time: self.build_time,
        }))
    }
}
