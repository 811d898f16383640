//! # Render Regions
//!
//! Sections are grouped into regions of 8x4x8 sections that share one vertex arena.
//! Drawing a region binds its buffer once and issues one draw per visible model part,
//! and the frustum is tested once per region before any of its sections.
//!
//! ## Architecture
//!
//! - [`RenderRegion`]: member set, cached visibility and lazily created [`RegionResources`]
//! - [`RegionResources`]: the vertex arena plus tables indexed by a section's slot in
//!   the region ([`RenderRegion::chunk_index`])
//! - [`RenderRegionManager`]: owns every region and performs batched uploads
//!
//! A section's passes are uploaded as one arena allocation. The geometry table holds
//! that allocation, the per-pass tables hold where each pass lives inside it.

pub mod id_pool;
pub mod manager;

pub use id_pool::IdPool;
pub use manager::RenderRegionManager;

use std::collections::HashSet;

use cgmath::{Point3, Vector3};

use super::data::ChunkPassModel;
use super::section::SectionId;
use super::{RenderPass, Vertex};
use crate::core::StResource;
use crate::engine_state::buffer_state::{BufferArena, BufferPool, BufferSegment, DeviceHandle};
use crate::engine_state::camera_state::{Frustum, Visibility};
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;

pub const REGION_WIDTH: i32 = 8;
pub const REGION_HEIGHT: i32 = 4;
pub const REGION_LENGTH: i32 = 8;

const REGION_WIDTH_SH: i32 = REGION_WIDTH.trailing_zeros() as i32;
const REGION_HEIGHT_SH: i32 = REGION_HEIGHT.trailing_zeros() as i32;
const REGION_LENGTH_SH: i32 = REGION_LENGTH.trailing_zeros() as i32;

/// Sections per region.
pub const REGION_SIZE: usize = (REGION_WIDTH * REGION_HEIGHT * REGION_LENGTH) as usize;

/// Blocks the region box is grown by before frustum testing, so the section holding
/// the camera is never rejected at region level.
pub const REGION_EXCESS: f32 = 8.0;

/// Initial arena capacity, in vertices per section.
const VERTICES_PER_SECTION: u32 = 756;

/// Region coordinates: section coordinates shifted down by the region size.
pub type RegionKey = Point3<i32>;

pub struct RenderRegion {
    key: RegionKey,
    id: usize,
    sections: HashSet<SectionId>,
    resources: Option<RegionResources>,
    visibility: Visibility,
}

impl RenderRegion {
    pub fn new(key: RegionKey, id: usize) -> Self {
        Self {
            key,
            id,
            sections: HashSet::new(),
            resources: None,
            visibility: Visibility::CULLED,
        }
    }

    /// The region containing the section at `position`.
    pub fn key_of(position: Point3<i32>) -> RegionKey {
        Point3::new(
            position.x >> REGION_WIDTH_SH,
            position.y >> REGION_HEIGHT_SH,
            position.z >> REGION_LENGTH_SH,
        )
    }

    /// Slot of the section at `position` inside its region.
    pub fn chunk_index(position: Point3<i32>) -> usize {
        let x = position.x & (REGION_WIDTH - 1);
        let y = position.y & (REGION_HEIGHT - 1);
        let z = position.z & (REGION_LENGTH - 1);

        (x * REGION_LENGTH * REGION_HEIGHT + y * REGION_LENGTH + z) as usize
    }

    /// Offset of the section at `position` from its region's origin, in blocks.
    pub fn local_origin(position: Point3<i32>) -> Vector3<i32> {
        Vector3::new(
            (position.x & (REGION_WIDTH - 1)) * CHUNK_DIMENSION,
            (position.y & (REGION_HEIGHT - 1)) * CHUNK_DIMENSION,
            (position.z & (REGION_LENGTH - 1)) * CHUNK_DIMENSION,
        )
    }

    pub fn key(&self) -> RegionKey {
        self.key
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// World position of the region's minimum corner, in blocks.
    pub fn origin(&self) -> Point3<i32> {
        Point3::new(
            (self.key.x << REGION_WIDTH_SH) * CHUNK_DIMENSION,
            (self.key.y << REGION_HEIGHT_SH) * CHUNK_DIMENSION,
            (self.key.z << REGION_LENGTH_SH) * CHUNK_DIMENSION,
        )
    }

    /// # Panics
    /// Panics if the section is already a member.
    pub fn add_chunk(&mut self, section: SectionId) {
        assert!(
            self.sections.insert(section),
            "Chunk {:?} is already a member of region {:?}",
            section,
            self.key
        );
    }

    /// # Panics
    /// Panics if the section is not a member.
    pub fn remove_chunk(&mut self, section: SectionId) {
        assert!(
            self.sections.remove(&section),
            "Chunk {:?} is not a member of region {:?}",
            section,
            self.key
        );
    }

    pub fn contains_chunk(&self, section: SectionId) -> bool {
        self.sections.contains(&section)
    }

    pub fn chunk_count(&self) -> usize {
        self.sections.len()
    }

    /// No member sections are left.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn resources(&self) -> Option<&RegionResources> {
        self.resources.as_ref()
    }

    pub fn resources_mut(&mut self) -> Option<&mut RegionResources> {
        self.resources.as_mut()
    }

    pub fn get_or_create_resources(
        &mut self,
        device: &DeviceHandle,
        pool: &StResource<BufferPool>,
    ) -> &mut RegionResources {
        self.resources
            .get_or_insert_with(|| RegionResources::new(device.clone(), pool.clone()))
    }

    /// Returns the region's buffer to the pool.
    pub fn delete_resources(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.delete();
        }
    }

    /// Releases whatever geometry the section at `chunk_id` had uploaded.
    pub fn delete_chunk_meshes(&mut self, chunk_id: usize) {
        if let Some(resources) = &mut self.resources {
            resources.delete_chunk_meshes(chunk_id);
        }
    }

    /// Tests the region's box, grown by [`REGION_EXCESS`], against `frustum`.
    pub fn update_visibility(&mut self, frustum: &Frustum) {
        let origin = self.origin();
        let size = Point3::new(
            (REGION_WIDTH * CHUNK_DIMENSION) as f32,
            (REGION_HEIGHT * CHUNK_DIMENSION) as f32,
            (REGION_LENGTH * CHUNK_DIMENSION) as f32,
        );

        let min = Point3::new(
            origin.x as f32 - REGION_EXCESS,
            origin.y as f32 - REGION_EXCESS,
            origin.z as f32 - REGION_EXCESS,
        );
        let max = Point3::new(
            origin.x as f32 + size.x + REGION_EXCESS,
            origin.y as f32 + size.y + REGION_EXCESS,
            origin.z as f32 + size.z + REGION_EXCESS,
        );

        self.visibility = frustum.test_box(min, max);
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }
}

/// Device memory of one region.
pub struct RegionResources {
    vertex_buffers: BufferArena,
    geometry: Vec<Option<BufferSegment>>,
    models: [Vec<Option<ChunkPassModel>>; RenderPass::COUNT],
}

impl RegionResources {
    fn new(device: DeviceHandle, pool: StResource<BufferPool>) -> Self {
        Self {
            vertex_buffers: BufferArena::new(
                device,
                pool,
                REGION_SIZE as u32 * VERTICES_PER_SECTION,
                Vertex::STRIDE,
            ),
            geometry: vec![None; REGION_SIZE],
            models: std::array::from_fn(|_| vec![None; REGION_SIZE]),
        }
    }

    pub fn arena(&self) -> &BufferArena {
        &self.vertex_buffers
    }

    pub fn arena_mut(&mut self) -> &mut BufferArena {
        &mut self.vertex_buffers
    }

    /// Where the section at `chunk_id` lives in the arena.
    pub fn geometry(&self, chunk_id: usize) -> Option<BufferSegment> {
        self.geometry[chunk_id]
    }

    /// Stores the section's new allocation, freeing the one it replaces.
    pub fn update_geometry(&mut self, chunk_id: usize, segment: Option<BufferSegment>) {
        if let Some(previous) = std::mem::replace(&mut self.geometry[chunk_id], segment) {
            self.vertex_buffers.free(previous);
        }
    }

    pub fn mesh(&self, pass: RenderPass, chunk_id: usize) -> Option<&ChunkPassModel> {
        self.models[pass.index()][chunk_id].as_ref()
    }

    /// Replaces the model of one pass, returning the previous one.
    pub fn update_mesh(
        &mut self,
        pass: RenderPass,
        mesh: Option<ChunkPassModel>,
        chunk_id: usize,
    ) -> Option<ChunkPassModel> {
        std::mem::replace(&mut self.models[pass.index()][chunk_id], mesh)
    }

    /// Clears every pass of the section and frees its allocation.
    pub fn delete_chunk_meshes(&mut self, chunk_id: usize) {
        for pass in RenderPass::all() {
            self.update_mesh(pass, None, chunk_id);
        }

        self.update_geometry(chunk_id, None);
    }

    /// Re-reads every stored offset from the arena, after it moved segments while
    /// growing.
    pub fn refresh_segments(&mut self) {
        for slot in self.geometry.iter_mut().flatten() {
            *slot = self
                .vertex_buffers
                .segment(slot.id)
                .unwrap_or_else(|| panic!("Segment {:?} vanished from the arena", slot.id));
        }
    }

    /// Compacts the arena and shifts every stored offset left by the free space that
    /// preceded it.
    pub fn defragment(&mut self) {
        let removed = self.vertex_buffers.compact();

        for slot in self.geometry.iter_mut().flatten() {
            let shift: u32 = removed
                .iter()
                .take_while(|gap| gap.offset < slot.offset)
                .map(|gap| gap.length)
                .sum();

            slot.offset -= shift;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_buffers.is_empty()
    }

    pub fn device_used_memory(&self) -> u64 {
        self.vertex_buffers.device_used_memory()
    }

    pub fn device_allocated_memory(&self) -> u64 {
        self.vertex_buffers.device_allocated_memory()
    }

    fn delete(self) {
        self.vertex_buffers.delete();
    }
}

#[cfg(test)]
mod tests {
    use thunderdome::Arena;

    use super::*;
    use crate::engine_state::buffer_state::{share_device, GpuDevice, HeadlessDevice, PendingUpload};

    #[test]
    fn keys_and_indices() {
        assert_eq!(RenderRegion::key_of(Point3::new(7, 3, 7)), Point3::new(0, 0, 0));
        assert_eq!(RenderRegion::key_of(Point3::new(8, 4, -1)), Point3::new(1, 1, -1));

        assert_eq!(RenderRegion::chunk_index(Point3::new(0, 0, 0)), 0);
        assert_eq!(RenderRegion::chunk_index(Point3::new(0, 0, 1)), 1);
        assert_eq!(RenderRegion::chunk_index(Point3::new(0, 1, 0)), 8);
        assert_eq!(RenderRegion::chunk_index(Point3::new(1, 0, 0)), 32);
        assert_eq!(RenderRegion::chunk_index(Point3::new(-1, -1, -1)), REGION_SIZE - 1);

        let region = RenderRegion::new(Point3::new(1, -1, 0), 0);
        assert_eq!(region.origin(), Point3::new(128, -64, 0));
    }

    #[test]
    #[should_panic(expected = "is already a member")]
    fn duplicate_membership_panics() {
        let mut ids = Arena::new();
        let id = SectionId(ids.insert(()));

        let mut region = RenderRegion::new(Point3::new(0, 0, 0), 0);
        region.add_chunk(id);
        region.add_chunk(id);
    }

    #[test]
    #[should_panic(expected = "is not a member")]
    fn missing_membership_panics() {
        let mut ids = Arena::new();
        let mut region = RenderRegion::new(Point3::new(0, 0, 0), 0);
        region.remove_chunk(SectionId(ids.insert(())));
    }

    #[test]
    fn defragment_patches_stored_offsets() {
        let device = StResource::new(HeadlessDevice::new());
        let handle = share_device(&device);
        let pool = StResource::new(BufferPool::new(handle.clone()));

        let mut region = RenderRegion::new(Point3::new(0, 0, 0), 0);
        let resources = region.get_or_create_resources(&handle, &pool);

        let bytes = |tag: u8, vertices: usize| vec![tag; vertices * Vertex::STRIDE as usize];
        let outcome = resources.arena_mut().upload(&[
            PendingUpload::new(bytes(1, 10)),
            PendingUpload::new(bytes(2, 20)),
            PendingUpload::new(bytes(3, 30)),
        ]);
        for (chunk_id, segment) in outcome.segments.into_iter().enumerate() {
            resources.update_geometry(chunk_id, Some(segment));
        }

        resources.update_geometry(1, None);
        assert!(resources.arena().fragmentation() > 0.0);
        resources.defragment();

        let arena = resources.arena();
        for chunk_id in [0, 2] {
            let stored = resources.geometry(chunk_id).unwrap();
            assert_eq!(arena.segment(stored.id), Some(stored));

            let data = device
                .get()
                .read_buffer(arena.buffer(), arena.to_bytes(stored.offset), arena.to_bytes(stored.length))
                .unwrap();
            assert!(data.iter().all(|&b| b == chunk_id as u8 + 1));
        }

        region.delete_chunk_meshes(0);
        region.delete_chunk_meshes(2);
        assert!(region.resources().unwrap().is_empty());
    }
}
