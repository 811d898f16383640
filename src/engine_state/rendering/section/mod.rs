//! # Render Sections
//!
//! A [`RenderSection`] is the render-side twin of one 16³ section of the world. It owns
//! the section's built [`ChunkRenderData`], its pending rebuild, the handle of the job
//! currently building it and the per-frame state of the visibility search.
//!
//! ## Architecture
//!
//! Sections live in a generational [`thunderdome::Arena`] owned by the section manager
//! and refer to each other by [`SectionId`]. Each section stores the ids of its six
//! neighbours; the manager is the only place that links and unlinks them, keeping every
//! pair symmetric. Because ids are generational, a build result for a section that was
//! unloaded and reloaded in the meantime no longer resolves and is dropped.
//!
//! - `graph`: per-frame visibility state and the search queue
//! - `adjacency`: which columns are loaded, used to decide when a section may build

pub mod adjacency;
pub mod graph;

pub use adjacency::ChunkAdjacencyMap;
pub use graph::{ChunkGraphInfo, ChunkGraphIterationQueue};

use std::sync::Arc;

use cgmath::Point3;
use thunderdome::Index;

use super::data::ChunkRenderData;
use super::region::{RegionKey, RenderRegion};
use crate::engine_state::camera_state::Frustum;
use crate::engine_state::task_management::job::ChunkJob;
use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;

/// Half the edge of the box tested against the frustum, slightly larger than a section
/// so geometry on the boundary is never culled.
const FRUSTUM_RADIUS: f32 = 9.0;

/// Stable, generational name of a [`RenderSection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SectionId(pub(crate) Index);

/// Why a section needs to be rebuilt, in ascending priority.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkUpdateType {
    /// First build after the section was loaded.
    INITIAL_BUILD,
    /// The section changed somewhere away from the player.
    REBUILD,
    /// The section changed close to the player and must be ready this frame.
    IMPORTANT_REBUILD,
}

impl ChunkUpdateType {
    pub const COUNT: usize = 3;

    pub const fn all() -> [ChunkUpdateType; Self::COUNT] {
        [
            ChunkUpdateType::INITIAL_BUILD,
            ChunkUpdateType::REBUILD,
            ChunkUpdateType::IMPORTANT_REBUILD,
        ]
    }

    /// Whether a pending update of type `previous` may be replaced by `next`.
    pub fn can_change(previous: Option<ChunkUpdateType>, next: ChunkUpdateType) -> bool {
        previous.map_or(true, |previous| next > previous)
    }

    /// Important rebuilds are waited on before the frame is drawn.
    pub fn is_important(self) -> bool {
        self == ChunkUpdateType::IMPORTANT_REBUILD
    }
}

pub struct RenderSection {
    position: Point3<i32>,
    region: RegionKey,
    chunk_id: usize,

    adjacent: [Option<SectionId>; 6],
    graph: ChunkGraphInfo,
    data: Arc<ChunkRenderData>,

    pending_update: Option<ChunkUpdateType>,
    build_job: Option<Arc<dyn ChunkJob>>,
    last_accepted_build_time: i32,

    ticks: u64,
    disposed: bool,
}

impl RenderSection {
    /// A freshly loaded, never built section.
    pub fn new(position: Point3<i32>) -> Self {
        Self {
            position,
            region: RenderRegion::key_of(position),
            chunk_id: RenderRegion::chunk_index(position),
            adjacent: [None; 6],
            graph: ChunkGraphInfo::new(),
            data: ChunkRenderData::absent(),
            pending_update: None,
            build_job: None,
            last_accepted_build_time: -1,
            ticks: 0,
            disposed: false,
        }
    }

    /// Section coordinates.
    pub fn position(&self) -> Point3<i32> {
        self.position
    }

    pub fn region(&self) -> RegionKey {
        self.region
    }

    /// Slot of the section inside its region.
    pub fn chunk_id(&self) -> usize {
        self.chunk_id
    }

    /// World position of the section's minimum corner, in blocks.
    pub fn origin(&self) -> Point3<i32> {
        self.position * CHUNK_DIMENSION
    }

    /// World position of the section's centre.
    pub fn center(&self) -> Point3<f32> {
        let origin = self.origin();
        let half = CHUNK_DIMENSION as f32 / 2.0;

        Point3::new(
            origin.x as f32 + half,
            origin.y as f32 + half,
            origin.z as f32 + half,
        )
    }

    /// Squared distance from `point` to the section's centre.
    pub fn squared_distance(&self, point: Point3<f32>) -> f32 {
        let center = self.center();
        let (dx, dy, dz) = (point.x - center.x, point.y - center.y, point.z - center.z);

        dx * dx + dy * dy + dz * dz
    }

    /// Squared horizontal distance from `(x, z)` to the section's centre.
    pub fn squared_distance_xz(&self, x: f32, z: f32) -> f32 {
        let center = self.center();
        let (dx, dz) = (x - center.x, z - center.z);

        dx * dx + dz * dz
    }

    pub fn adjacent(&self, side: BlockSide) -> Option<SectionId> {
        self.adjacent[side as usize]
    }

    pub(crate) fn set_adjacent(&mut self, side: BlockSide, section: Option<SectionId>) {
        self.adjacent[side as usize] = section;
    }

    pub fn graph_info(&self) -> &ChunkGraphInfo {
        &self.graph
    }

    pub fn graph_info_mut(&mut self) -> &mut ChunkGraphInfo {
        &mut self.graph
    }

    pub fn data(&self) -> &Arc<ChunkRenderData> {
        &self.data
    }

    /// Replaces the built data and refreshes the occlusion used by the graph.
    pub fn set_data(&mut self, data: Arc<ChunkRenderData>) {
        self.graph.set_occlusion_data(data.occlusion_data());
        self.data = data;
    }

    /// Whether the section has been built at least once.
    pub fn is_built(&self) -> bool {
        !Arc::ptr_eq(&self.data, &ChunkRenderData::absent())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_tickable(&self) -> bool {
        self.data.is_tickable()
    }

    /// Advances the section's animated sprites by one tick.
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Requests a rebuild. Returns `true` if the pending update changed; a pending update
    /// is only ever promoted, never downgraded.
    pub fn mark_for_update(&mut self, update: ChunkUpdateType) -> bool {
        if ChunkUpdateType::can_change(self.pending_update, update) {
            self.pending_update = Some(update);
            true
        } else {
            false
        }
    }

    pub fn pending_update(&self) -> Option<ChunkUpdateType> {
        self.pending_update
    }

    /// Records the job now building this section, cancelling the one it replaces.
    pub fn on_build_submitted(&mut self, job: Arc<dyn ChunkJob>) {
        self.cancel_rebuild_task();
        self.build_job = Some(job);
        self.pending_update = None;
    }

    pub fn cancel_rebuild_task(&mut self) {
        if let Some(job) = self.build_job.take() {
            job.cancel();
        }
    }

    pub fn build_job(&self) -> Option<&Arc<dyn ChunkJob>> {
        self.build_job.as_ref()
    }

    pub fn last_accepted_build_time(&self) -> i32 {
        self.last_accepted_build_time
    }

    pub fn set_last_accepted_build_time(&mut self, build_time: i32) {
        self.last_accepted_build_time = build_time;
    }

    /// Whether the section has been unloaded.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Cancels any running build and resets the section to empty. Its region geometry is
    /// released by the caller.
    pub fn delete(&mut self) {
        self.cancel_rebuild_task();
        self.set_data(ChunkRenderData::empty());
        self.disposed = true;
    }

    /// Tests a box slightly larger than the section against `frustum`.
    pub fn is_culled_by_frustum(&self, frustum: &Frustum) -> bool {
        let center = self.center();

        !frustum.contains_box(
            Point3::new(
                center.x - FRUSTUM_RADIUS,
                center.y - FRUSTUM_RADIUS,
                center.z - FRUSTUM_RADIUS,
            ),
            Point3::new(
                center.x + FRUSTUM_RADIUS,
                center.y + FRUSTUM_RADIUS,
                center.z + FRUSTUM_RADIUS,
            ),
        )
    }
}

impl std::fmt::Debug for RenderSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSection")
            .field("position", &self.position)
            .field("pending_update", &self.pending_update)
            .field("last_accepted_build_time", &self.last_accepted_build_time)
            .field("disposed", &self.disposed)
            .finish()
    }
}
