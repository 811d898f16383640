//! Ownership of every region and the batched upload of build results.

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::Point3;
use thunderdome::Arena;

use super::{IdPool, RegionKey, RenderRegion};
use crate::core::StResource;
use crate::engine_state::buffer_state::{BufferPool, DeviceHandle, PendingUpload};
use crate::engine_state::camera_state::Frustum;
use crate::engine_state::rendering::data::ChunkRenderData;
use crate::engine_state::rendering::section::{RenderSection, SectionId};
use crate::engine_state::rendering::tasks::TerrainBuildResult;
use crate::engine_state::rendering::RenderPass;

/// Reserve-to-active ratio of the buffer pool above which it is pruned.
pub const PRUNE_RATIO_THRESHOLD: f32 = 0.35;
/// Share of the reserve destroyed by one prune.
pub const PRUNE_PERCENT_MODIFIER: f32 = -0.2;
/// Default arena fragmentation above which a region is compacted after uploading.
pub const DEFRAG_THRESHOLD: f32 = 0.000008;

pub struct RenderRegionManager {
    regions: HashMap<RegionKey, RenderRegion>,
    id_pool: IdPool,
    device: DeviceHandle,
    pool: StResource<BufferPool>,
    defrag_threshold: f32,
}

impl RenderRegionManager {
    pub fn new(device: DeviceHandle, defrag_threshold: f32) -> Self {
        let pool = StResource::new(BufferPool::new(device.clone()));

        Self {
            regions: HashMap::new(),
            id_pool: IdPool::new(),
            device,
            pool,
            defrag_threshold,
        }
    }

    /// The region containing the section at `position`, created if needed.
    pub fn create_region_for_chunk(&mut self, position: Point3<i32>) -> &mut RenderRegion {
        let key = RenderRegion::key_of(position);
        let id_pool = &mut self.id_pool;

        self.regions.entry(key).or_insert_with(|| {
            let id = id_pool.create();
            log::trace!("Created region {:?} with id {}", key, id);
            RenderRegion::new(key, id)
        })
    }

    pub fn get_region(&self, key: RegionKey) -> Option<&RenderRegion> {
        self.regions.get(&key)
    }

    pub fn get_region_mut(&mut self, key: RegionKey) -> Option<&mut RenderRegion> {
        self.regions.get_mut(&key)
    }

    pub fn regions(&self) -> impl Iterator<Item = &RenderRegion> {
        self.regions.values()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Tests every region against this frame's frustum.
    pub fn update_visibility(&mut self, frustum: &Frustum) {
        for region in self.regions.values_mut() {
            region.update_visibility(frustum);
        }
    }

    /// Uploads finished builds and makes their data current.
    ///
    /// Results for unloaded sections, and results no newer than what the section already
    /// shows, are dropped. Of several results for one section only the newest is kept.
    /// Each region receives its uploads as one batch and is compacted afterwards if its
    /// arena became fragmented.
    ///
    /// # Arguments
    /// * `results` - Finished builds, in any order
    /// * `sections` - Every loaded section
    /// * `on_data_changed` - Called with the section, its old data and its new data
    ///   whenever a result is accepted
    ///
    /// # Panics
    /// Panics if an accepted section's region does not exist.
    pub fn upload_chunks<F>(
        &mut self,
        results: impl IntoIterator<Item = TerrainBuildResult>,
        sections: &mut Arena<RenderSection>,
        mut on_data_changed: F,
    ) where
        F: FnMut(SectionId, &Arc<ChunkRenderData>, &Arc<ChunkRenderData>),
    {
        let batches = Self::setup_upload_batches(results, sections);

        for (key, batch) in batches {
            let region = self
                .regions
                .get_mut(&key)
                .unwrap_or_else(|| panic!("Couldn't find region {:?}", key));

            Self::upload_geometry_batch(region, &self.device, &self.pool, batch, sections, &mut on_data_changed);

            if let Some(resources) = region.resources_mut() {
                let fragmentation = resources.arena().fragmentation();
                if fragmentation >= self.defrag_threshold {
                    log::debug!(
                        "Defragmenting region {:?} ({:.4} fragmented)",
                        key,
                        fragmentation
                    );
                    resources.defragment();
                }
            }
        }

        self.device.get_mut().flush();
    }

    fn setup_upload_batches(
        results: impl IntoIterator<Item = TerrainBuildResult>,
        sections: &Arena<RenderSection>,
    ) -> HashMap<RegionKey, Vec<TerrainBuildResult>> {
        let mut newest: HashMap<SectionId, TerrainBuildResult> = HashMap::new();

        for result in results {
            let Some(section) = sections.get(result.section.0) else {
                continue;
            };

            if section.is_disposed() || result.build_time <= section.last_accepted_build_time() {
                log::trace!(
                    "Dropping stale build {} of {:?}",
                    result.build_time,
                    section.position()
                );
                continue;
            }

            match newest.get(&result.section) {
                Some(existing) if existing.build_time >= result.build_time => {}
                _ => {
                    newest.insert(result.section, result);
                }
            }
        }

        let mut batches: HashMap<RegionKey, Vec<TerrainBuildResult>> = HashMap::new();
        for result in newest.into_values() {
            let key = sections[result.section.0].region();
            batches.entry(key).or_default().push(result);
        }

        batches
    }

    fn upload_geometry_batch<F>(
        region: &mut RenderRegion,
        device: &DeviceHandle,
        pool: &StResource<BufferPool>,
        mut batch: Vec<TerrainBuildResult>,
        sections: &mut Arena<RenderSection>,
        on_data_changed: &mut F,
    ) where
        F: FnMut(SectionId, &Arc<ChunkRenderData>, &Arc<ChunkRenderData>),
    {
        let has_geometry = batch.iter().any(|result| result.geometry.vertices.is_some());

        if has_geometry {
            let resources = region.get_or_create_resources(device, pool);

            let mut uploads = Vec::new();
            let mut owners = Vec::new();

            for (index, result) in batch.iter_mut().enumerate() {
                let chunk_id = sections[result.section.0].chunk_id();
                resources.delete_chunk_meshes(chunk_id);

                if let Some(vertices) = result.geometry.vertices.take() {
                    uploads.push(PendingUpload::new(vertices));
                    owners.push(index);
                }
            }

            let outcome = resources.arena_mut().upload(&uploads);
            if outcome.resized {
                resources.refresh_segments();
            }

            for (segment, index) in outcome.segments.into_iter().zip(owners) {
                let result = &batch[index];
                let chunk_id = sections[result.section.0].chunk_id();

                resources.update_geometry(chunk_id, Some(segment));
                for pass in RenderPass::all() {
                    resources.update_mesh(pass, result.geometry.models[pass.index()].clone(), chunk_id);
                }
            }
        } else {
            // only clears old geometry; a region without any stays without an arena
            for result in &batch {
                region.delete_chunk_meshes(sections[result.section.0].chunk_id());
            }
        }

        for result in batch {
            let section = &mut sections[result.section.0];
            let previous = section.data().clone();

            on_data_changed(result.section, &previous, &result.data);

            section.set_data(result.data);
            section.set_last_accepted_build_time(result.build_time);
        }
    }

    /// Deletes regions without members and prunes the buffer pool if its reserve has
    /// grown large compared to what is in use.
    pub fn cleanup(&mut self) {
        let id_pool = &mut self.id_pool;

        self.regions.retain(|key, region| {
            if !region.is_empty() {
                return true;
            }

            region.delete_resources();
            id_pool.free(region.id());
            log::trace!("Deleted region {:?}", key);
            false
        });

        let (reserved, active) = {
            let pool = self.pool.get();
            (pool.reserved_memory(), pool.active_memory())
        };

        if active > 0 && reserved as f32 / active as f32 > PRUNE_RATIO_THRESHOLD {
            self.prune();
        }
    }

    /// Destroys part of the buffer pool's reserve.
    pub fn prune(&mut self) {
        self.pool.get_mut().prune(PRUNE_PERCENT_MODIFIER);
    }

    /// Releases every region and every pooled buffer.
    pub fn delete(&mut self) {
        for (_, mut region) in self.regions.drain() {
            region.delete_resources();
            self.id_pool.free(region.id());
        }

        self.pool.get_mut().delete();
    }

    pub fn device_used_memory(&self) -> u64 {
        self.regions
            .values()
            .filter_map(RenderRegion::resources)
            .map(|resources| resources.device_used_memory())
            .sum()
    }

    /// Memory of every region buffer plus the buffer pool's reserve.
    pub fn device_allocated_memory(&self) -> u64 {
        let regions: u64 = self
            .regions
            .values()
            .filter_map(RenderRegion::resources)
            .map(|resources| resources.device_allocated_memory())
            .sum();

        regions + self.pool.get().reserved_memory()
    }

    /// Region buffers plus pooled buffers.
    pub fn device_buffer_objects(&self) -> usize {
        let regions = self
            .regions
            .values()
            .filter(|region| region.resources().is_some())
            .count();

        regions + self.pool.get().reserved_buffers()
    }

    /// Size a table indexed by region id must have.
    pub fn region_table_size(&self) -> usize {
        self.id_pool.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::buffer_state::{share_device, HeadlessDevice};
    use crate::engine_state::rendering::meshing::BuiltChunkGeometry;
    use crate::engine_state::rendering::Vertex;

    fn manager() -> RenderRegionManager {
        let device = StResource::new(HeadlessDevice::new());
        RenderRegionManager::new(share_device(&device), DEFRAG_THRESHOLD)
    }

    fn load(manager: &mut RenderRegionManager, sections: &mut Arena<RenderSection>, position: Point3<i32>) -> SectionId {
        let id = SectionId(sections.insert(RenderSection::new(position)));
        manager.create_region_for_chunk(position).add_chunk(id);
        id
    }

    fn result(section: SectionId, build_time: i32, vertices: usize) -> TerrainBuildResult {
        TerrainBuildResult {
            section,
            data: ChunkRenderData::empty(),
            geometry: BuiltChunkGeometry {
                vertices: (vertices > 0).then(|| vec![build_time as u8; vertices * Vertex::STRIDE as usize]),
                models: Default::default(),
            },
            build_time,
        }
    }

    #[test]
    fn regions_are_shared_by_nearby_sections() {
        let mut manager = manager();
        let mut sections = Arena::new();

        load(&mut manager, &mut sections, Point3::new(0, 0, 0));
        load(&mut manager, &mut sections, Point3::new(7, 3, 7));
        load(&mut manager, &mut sections, Point3::new(8, 0, 0));

        assert_eq!(manager.region_count(), 2);
        assert_eq!(manager.get_region(Point3::new(0, 0, 0)).unwrap().chunk_count(), 2);
        assert_eq!(manager.region_table_size(), 2);
    }

    #[test]
    fn stale_results_are_rejected_in_either_order() {
        let mut manager = manager();
        let mut sections = Arena::new();
        let id = load(&mut manager, &mut sections, Point3::new(0, 0, 0));

        manager.upload_chunks([result(id, 2, 8), result(id, 1, 4)], &mut sections, |_, _, _| {});
        assert_eq!(sections[id.0].last_accepted_build_time(), 2);

        manager.upload_chunks([result(id, 1, 4)], &mut sections, |_, _, _| {});
        assert_eq!(sections[id.0].last_accepted_build_time(), 2);

        let region = manager.get_region(Point3::new(0, 0, 0)).unwrap();
        let segment = region.resources().unwrap().geometry(sections[id.0].chunk_id()).unwrap();
        assert_eq!(segment.length, 8);
    }

    #[test]
    fn disposed_sections_are_skipped() {
        let mut manager = manager();
        let mut sections = Arena::new();
        let id = load(&mut manager, &mut sections, Point3::new(0, 0, 0));
        sections[id.0].delete();

        let mut calls = 0;
        manager.upload_chunks([result(id, 1, 4)], &mut sections, |_, _, _| calls += 1);

        assert_eq!(calls, 0);
        assert_eq!(manager.device_used_memory(), 0);
    }

    #[test]
    fn reupload_replaces_previous_geometry() {
        let mut manager = manager();
        let mut sections = Arena::new();
        let id = load(&mut manager, &mut sections, Point3::new(0, 0, 0));

        manager.upload_chunks([result(id, 1, 10)], &mut sections, |_, _, _| {});
        manager.upload_chunks([result(id, 2, 6)], &mut sections, |_, _, _| {});

        assert_eq!(manager.device_used_memory(), 6 * Vertex::STRIDE as u64);

        manager.upload_chunks([result(id, 3, 0)], &mut sections, |_, _, _| {});
        assert_eq!(manager.device_used_memory(), 0);
    }

    #[test]
    fn empty_batches_do_not_allocate_an_arena() {
        let mut manager = manager();
        let mut sections = Arena::new();
        let a = load(&mut manager, &mut sections, Point3::new(0, 0, 0));
        let b = load(&mut manager, &mut sections, Point3::new(1, 0, 0));

        let mut accepted = 0;
        manager.upload_chunks([result(a, 1, 0), result(b, 1, 0)], &mut sections, |_, _, _| accepted += 1);

        assert_eq!(accepted, 2);
        assert_eq!(sections[a.0].last_accepted_build_time(), 1);
        assert!(manager.get_region(Point3::new(0, 0, 0)).unwrap().resources().is_none());
        assert_eq!(manager.device_buffer_objects(), 0);
        assert_eq!(manager.device_allocated_memory(), 0);
    }

    #[test]
    fn cleanup_frees_empty_regions_and_their_ids() {
        let mut manager = manager();
        let mut sections = Arena::new();
        let a = load(&mut manager, &mut sections, Point3::new(0, 0, 0));
        load(&mut manager, &mut sections, Point3::new(8, 0, 0));

        manager.upload_chunks([result(a, 1, 4)], &mut sections, |_, _, _| {});
        assert_eq!(manager.device_buffer_objects(), 1);

        let region = manager.get_region_mut(Point3::new(0, 0, 0)).unwrap();
        region.delete_chunk_meshes(sections[a.0].chunk_id());
        region.remove_chunk(a);
        manager.cleanup();

        assert_eq!(manager.region_count(), 1);
        assert_eq!(manager.device_used_memory(), 0);
        assert!(manager.device_allocated_memory() <= manager.pool.get().reserved_memory());

        let recreated = manager.create_region_for_chunk(Point3::new(-1, 0, 0)).id();
        assert_eq!(recreated, 0);
    }
}
