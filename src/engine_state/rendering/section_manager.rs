//! # Render Section Manager
//!
//! Owns every [`RenderSection`], decides each frame which of them are visible, schedules
//! their rebuilds on the [`ChunkBuilder`] and uploads the results into their regions.
//!
//! ## Architecture
//!
//! - Loading a column creates one section per world section Y and links it to its
//!   loaded neighbours. Unloading unlinks it, cancels its build and frees its geometry.
//! - [`RenderSectionManager::update`] runs a breadth-first search from the camera's
//!   section. A section is entered at most once per frame, only through faces its
//!   occlusion data marks as connected, and never back towards the side the search
//!   came from.
//! - Sections reached by the search with a pending rebuild are queued per
//!   [`ChunkUpdateType`]. [`RenderSectionManager::update_chunks`] submits them within
//!   the builder's budget. Important rebuilds are waited on the same frame; everything
//!   else comes back through a channel drained on later frames.
//!
//! ## Performance Considerations
//! - Sections are stamped with the frame index instead of clearing a visited set
//! - Region-level frustum results let most sections skip their own frustum test
//! - While waiting on important rebuilds the calling thread runs queued blocking jobs
//!   itself rather than sleeping

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use cgmath::{Point3, Vector3};
use thunderdome::Arena;

use super::backend::{DrawCommand, MeshBackend, RegionDrawBatch};
use super::data::{BlockEntity, ChunkRenderData, ModelPart};
use super::lists::{ChunkRenderList, SortedChunkLists, SortedTerrainLists};
use super::region::{RegionKey, RenderRegion, RenderRegionManager};
use super::section::{
    ChunkAdjacencyMap, ChunkGraphInfo, ChunkGraphIterationQueue, ChunkUpdateType, RenderSection,
    SectionId,
};
use super::tasks::{EmptyTerrainBuildTask, TerrainBuildResult, TerrainBuildTask};
use super::RenderPass;
use crate::core::MtResource;
use crate::engine_state::buffer_state::{BufferHandle, DeviceHandle};
use crate::engine_state::camera_state::{ChunkCamera, Frustum, Visibility};
use crate::engine_state::config::TerrainConfig;
use crate::engine_state::task_management::{ChunkBuilder, ChunkBuilderTask, ChunkJob, ChunkJobResult};
use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
use crate::engine_state::voxels::{WorldSlice, WorldView};

/// Sections closer than this (squared, in blocks) are rebuilt with priority.
pub const NEARBY_CHUNK_DISTANCE: f32 = 48.0 * 48.0;

/// Lower bound of the squared fog cutoff.
const FOG_PLANE_MIN_DISTANCE: f32 = 8.0 * 8.0;

/// Blocks added to the fog end before culling, so half-fogged sections still draw.
const FOG_PLANE_OFFSET: f32 = 12.0;

pub struct RenderSectionManager {
    builder: ChunkBuilder,
    world: MtResource<dyn WorldView>,
    regions: RenderRegionManager,
    config: TerrainConfig,

    sections: Arena<RenderSection>,
    section_map: HashMap<Point3<i32>, SectionId>,
    adjacency: ChunkAdjacencyMap,

    rebuild_queues: [VecDeque<SectionId>; ChunkUpdateType::COUNT],
    iteration_queue: ChunkGraphIterationQueue,
    render_list: ChunkRenderList,
    chunk_lists: SortedChunkLists,
    terrain_lists: SortedTerrainLists,
    tickable: Vec<SectionId>,
    visible_block_entities: Vec<BlockEntity>,
    global_block_entities: HashSet<BlockEntity>,

    result_sender: Sender<TerrainBuildResult>,
    result_receiver: Receiver<TerrainBuildResult>,
    /// Region buffers the backend has been told about
    backend_buffers: HashMap<RegionKey, BufferHandle>,

    camera: Point3<f32>,
    frustum: Frustum,
    fog_end: f32,
    use_fog_culling: bool,
    fog_render_cutoff: f32,
    use_occlusion_culling: bool,
    center_chunk_x: i32,
    center_chunk_z: i32,
    current_frame: i32,
    next_build_time: i32,
    needs_update: bool,
}

impl RenderSectionManager {
    /// Creates the manager and starts its worker threads.
    ///
    /// # Arguments
    /// * `device` - Where region buffers are allocated
    /// * `world` - Block data read when sections load and builds are scheduled
    /// * `config` - Render distance, culling switches and builder settings
    pub fn new(
        device: DeviceHandle,
        world: MtResource<dyn WorldView>,
        config: &TerrainConfig,
    ) -> anyhow::Result<Self> {
        let builder = ChunkBuilder::new(config.builder_threads)?;
        let (result_sender, result_receiver) = mpsc::channel();

        log::info!(
            "Render section manager started with {} builder threads, render distance {}",
            builder.total_thread_count(),
            config.render_distance
        );

        Ok(Self {
            builder,
            world,
            regions: RenderRegionManager::new(device, config.defrag_threshold),
            config: config.clone(),
            sections: Arena::new(),
            section_map: HashMap::new(),
            adjacency: ChunkAdjacencyMap::new(),
            rebuild_queues: Default::default(),
            iteration_queue: ChunkGraphIterationQueue::default(),
            render_list: ChunkRenderList::default(),
            chunk_lists: SortedChunkLists::default(),
            terrain_lists: SortedTerrainLists::new(),
            tickable: Vec::new(),
            visible_block_entities: Vec::new(),
            global_block_entities: HashSet::new(),
            result_sender,
            result_receiver,
            backend_buffers: HashMap::new(),
            camera: Point3::new(0.0, 0.0, 0.0),
            frustum: Frustum::unbounded(),
            fog_end: (config.render_distance * CHUNK_DIMENSION) as f32,
            use_fog_culling: false,
            fog_render_cutoff: 0.0,
            use_occlusion_culling: config.use_occlusion_culling,
            center_chunk_x: 0,
            center_chunk_z: 0,
            current_frame: 0,
            next_build_time: 0,
            needs_update: true,
        })
    }

    /// Distance, in blocks, at which fog fully hides terrain. Takes effect on the next
    /// [`update`](Self::update).
    pub fn set_fog_end(&mut self, fog_end: f32) {
        self.fog_end = fog_end;
    }

    /// Recomputes the visible set and the draw lists.
    ///
    /// `frame` must differ from the frame of the previous call: sections already
    /// stamped with it are treated as visited.
    ///
    /// # Arguments
    /// * `camera` - Where the search starts
    /// * `frustum` - View frustum for region and section culling
    /// * `frame` - Index of the frame being prepared
    /// * `spectator` - The camera may be inside solid blocks
    pub fn update(&mut self, camera: &ChunkCamera, frustum: &Frustum, frame: i32, spectator: bool) {
        self.reset_lists();

        self.regions.update_visibility(frustum);

        self.setup(camera);
        self.iterate_chunks(camera, frustum, frame, spectator);

        self.chunk_lists = SortedChunkLists::new(&self.render_list, &self.sections);
        self.terrain_lists.update(
            &self.chunk_lists,
            &self.sections,
            &self.regions,
            camera.position,
            self.config.use_block_face_culling,
        );

        self.needs_update = false;
    }

    fn setup(&mut self, camera: &ChunkCamera) {
        self.camera = camera.position;
        self.use_fog_culling = false;

        if self.config.use_fog_occlusion {
            let dist = self.fog_end + FOG_PLANE_OFFSET;

            if dist != 0.0 {
                self.use_fog_culling = true;
                self.fog_render_cutoff = FOG_PLANE_MIN_DISTANCE.max(dist * dist);
            }
        }
    }

    fn iterate_chunks(&mut self, camera: &ChunkCamera, frustum: &Frustum, frame: i32, spectator: bool) {
        self.init_search(camera, frustum, frame, spectator);

        let mut index = 0;
        while index < self.iteration_queue.len() {
            let (id, flow) = self.iteration_queue.get(index);
            index += 1;

            self.schedule_pending_updates(id);

            for dir in BlockSide::all() {
                let section = &self.sections[id.0];

                if self.is_culled(section.graph_info(), flow, dir) {
                    continue;
                }

                let Some(adj) = section.adjacent(dir) else {
                    continue;
                };

                if self.is_within_render_distance(&self.sections[adj.0]) {
                    self.bfs_enqueue(id, adj, dir.opposite());
                }
            }
        }
    }

    fn schedule_pending_updates(&mut self, id: SectionId) {
        let section = &self.sections[id.0];

        let Some(update) = section.pending_update() else {
            return;
        };

        let position = section.position();
        if !self.adjacency.has_neighbors(position.x, position.z) {
            return;
        }

        let queue = &mut self.rebuild_queues[update as usize];
        if queue.len() >= self.config.rebuild_queue_cap {
            return;
        }

        queue.push_back(id);
    }

    fn bfs_enqueue(&mut self, parent: SectionId, id: SectionId, flow: BlockSide) {
        let parent = &self.sections[parent.0];
        let parent_culling = parent.graph_info().culling_state();
        let parent_visibility = self
            .regions
            .get_region(parent.region())
            .map_or(Visibility::CULLED, RenderRegion::visibility);

        let section = &mut self.sections[id.0];
        if section.graph_info().last_visible_frame() == self.current_frame {
            return;
        }

        match parent_visibility {
            Visibility::CULLED => return,
            Visibility::VISIBLE if section.is_culled_by_frustum(&self.frustum) => return,
            _ => {}
        }

        let graph = section.graph_info_mut();
        graph.set_last_visible_frame(self.current_frame);
        graph.set_culling_state(parent_culling, flow);

        self.add_visible(id, Some(flow));
    }

    fn add_visible(&mut self, id: SectionId, flow: Option<BlockSide>) {
        self.iteration_queue.add(id, flow);

        let section = &self.sections[id.0];
        if self.use_fog_culling
            && section.squared_distance_xz(self.camera.x, self.camera.z) >= self.fog_render_cutoff
        {
            return;
        }

        if !section.is_empty() {
            self.render_list.add(id);

            if section.is_tickable() {
                self.tickable.push(id);
            }

            self.visible_block_entities
                .extend_from_slice(section.data().block_entities());
        }
    }

    fn init_search(&mut self, camera: &ChunkCamera, frustum: &Frustum, frame: i32, spectator: bool) {
        self.current_frame = frame;
        self.frustum = *frustum;
        self.use_occlusion_culling = self.config.use_occlusion_culling;
        self.iteration_queue.clear();

        let origin = camera.block_position;
        let chunk = camera.section_position;

        self.center_chunk_x = chunk.x;
        self.center_chunk_z = chunk.z;

        if let Some(&root) = self.section_map.get(&chunk) {
            let graph = self.sections[root.0].graph_info_mut();
            graph.reset_culling_state();
            graph.set_last_visible_frame(frame);

            if spectator && self.world.get().get_block(origin).is_opaque() {
                self.use_occlusion_culling = false;
            }

            self.add_visible(root, None);
        } else {
            let (min_y, max_y) = {
                let world = self.world.get();
                (world.min_section_y(), world.max_section_y())
            };
            let y = chunk.y.clamp(min_y, max_y - 1);
            let radius = self.config.render_distance;

            let mut sorted = Vec::new();
            for x in -radius..=radius {
                for z in -radius..=radius {
                    let position = Point3::new(chunk.x + x, y, chunk.z + z);
                    let Some(&id) = self.section_map.get(&position) else {
                        continue;
                    };

                    let section = &mut self.sections[id.0];
                    if section.is_culled_by_frustum(frustum) {
                        continue;
                    }

                    let graph = section.graph_info_mut();
                    graph.reset_culling_state();
                    graph.set_last_visible_frame(frame);

                    sorted.push(id);
                }
            }

            sorted.sort_by(|a, b| {
                let a = self.sections[a.0].squared_distance(camera.position);
                let b = self.sections[b.0].squared_distance(camera.position);
                a.total_cmp(&b)
            });

            for id in sorted {
                self.add_visible(id, None);
            }
        }
    }

    fn is_culled(&self, graph: &ChunkGraphInfo, flow: Option<BlockSide>, dir: BlockSide) -> bool {
        if graph.can_cull(dir) {
            return true;
        }

        match flow {
            Some(flow) => self.use_occlusion_culling && !graph.is_visible_through(flow, dir),
            None => false,
        }
    }

    /// Horizontal distance only; every Y inside a loaded column is in range.
    fn is_within_render_distance(&self, section: &RenderSection) -> bool {
        let position = section.position();
        let radius = self.config.render_distance;

        (position.x - self.center_chunk_x).abs() <= radius
            && (position.z - self.center_chunk_z).abs() <= radius
    }

    fn reset_lists(&mut self) {
        for queue in &mut self.rebuild_queues {
            queue.clear();
        }

        self.visible_block_entities.clear();
        self.render_list.clear();
        self.tickable.clear();
    }

    /// Submits queued rebuilds, uploads whatever has finished and releases empty
    /// regions.
    ///
    /// Important rebuilds are waited on before this returns, so an edit next to the
    /// player is visible on the frame it was made.
    pub fn update_chunks(&mut self) {
        let (blocking_sender, blocking_receiver) = mpsc::channel();

        let blocking = self.submit_rebuild_tasks(
            ChunkUpdateType::IMPORTANT_REBUILD,
            usize::MAX,
            Some(&blocking_sender),
        );
        drop(blocking_sender);

        let budget = self.builder.scheduling_budget();
        let budget = budget - self.submit_rebuild_tasks(ChunkUpdateType::INITIAL_BUILD, budget, None);
        self.submit_rebuild_tasks(ChunkUpdateType::REBUILD, budget, None);

        self.needs_update |= self.perform_pending_uploads();

        if blocking > 0 {
            let results = self.wait_for_blocking_tasks(blocking_receiver);

            if !results.is_empty() {
                self.upload(results);
                self.needs_update = true;
            }
        }

        self.regions.cleanup();
    }

    /// Submits up to `budget` sections from one queue. Returns how many were submitted.
    fn submit_rebuild_tasks(
        &mut self,
        update: ChunkUpdateType,
        mut budget: usize,
        blocking: Option<&Sender<ChunkJobResult<TerrainBuildResult>>>,
    ) -> usize {
        let mut submitted = 0;

        while budget > 0 {
            let Some(id) = self.rebuild_queues[update as usize].pop_front() else {
                break;
            };

            let Some(section) = self.sections.get(id.0) else {
                continue;
            };

            if section.is_disposed() {
                continue;
            }

            if section.pending_update() != Some(update) {
                log::warn!(
                    "{:?} changed update type to {:?} while in queue for {:?}, skipping",
                    section,
                    section.pending_update(),
                    update
                );
                continue;
            }

            let job = self.schedule_rebuild_task(id, blocking);
            self.sections[id.0].on_build_submitted(job);

            budget -= 1;
            submitted += 1;
        }

        submitted
    }

    fn schedule_rebuild_task(
        &mut self,
        id: SectionId,
        blocking: Option<&Sender<ChunkJobResult<TerrainBuildResult>>>,
    ) -> Arc<dyn ChunkJob> {
        let position = self.sections[id.0].position();
        let build_time = self.next_build_time;
        self.next_build_time += 1;

        let slice = WorldSlice::prepare(&*self.world.get(), position);

        match slice {
            Some(slice) => {
                let task = TerrainBuildTask::new(id, slice, RenderRegion::local_origin(position), build_time);
                self.schedule(task, blocking)
            }
            None => self.schedule(EmptyTerrainBuildTask::new(id, build_time), blocking),
        }
    }

    fn schedule<T>(
        &self,
        task: T,
        blocking: Option<&Sender<ChunkJobResult<TerrainBuildResult>>>,
    ) -> Arc<dyn ChunkJob>
    where
        T: ChunkBuilderTask<Output = TerrainBuildResult>,
    {
        match blocking {
            Some(sender) => {
                let sender = sender.clone();
                self.builder.schedule_task(task, false, move |result| {
                    let _ = sender.send(result);
                })
            }
            None => {
                let sender = self.result_sender.clone();
                self.builder.schedule_task(task, true, move |result| {
                    if let ChunkJobResult::Succeeded(output) = result {
                        let _ = sender.send(output);
                    }
                })
            }
        }
    }

    /// Runs or waits for every blocking job until all of their consumers are gone.
    fn wait_for_blocking_tasks(
        &self,
        receiver: Receiver<ChunkJobResult<TerrainBuildResult>>,
    ) -> Vec<TerrainBuildResult> {
        let mut results = Vec::new();

        loop {
            let result = match receiver.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    if self.builder.steal_blocking_task() {
                        continue;
                    }

                    match receiver.recv() {
                        Ok(result) => result,
                        Err(_) => break,
                    }
                }
            };

            if let ChunkJobResult::Succeeded(output) = result {
                results.push(output);
            }
        }

        results
    }

    fn perform_pending_uploads(&mut self) -> bool {
        let results: Vec<TerrainBuildResult> = self.result_receiver.try_iter().collect();

        if results.is_empty() {
            return false;
        }

        self.upload(results);
        true
    }

    fn upload(&mut self, results: Vec<TerrainBuildResult>) {
        let global_block_entities = &mut self.global_block_entities;

        self.regions
            .upload_chunks(results, &mut self.sections, |_, previous, next| {
                Self::on_chunk_data_changed(global_block_entities, previous, next);
            });
    }

    fn on_chunk_data_changed(
        global_block_entities: &mut HashSet<BlockEntity>,
        previous: &Arc<ChunkRenderData>,
        next: &Arc<ChunkRenderData>,
    ) {
        for entity in previous.global_block_entities() {
            global_block_entities.remove(entity);
        }

        global_block_entities.extend(next.global_block_entities().iter().copied());
    }

    /// Creates render sections for every world section of the column at (x, z).
    pub fn on_chunk_added(&mut self, x: i32, z: i32) {
        self.adjacency.on_chunk_loaded(x, z);

        let (min_y, max_y) = self.section_y_range();
        for y in min_y..max_y {
            self.needs_update |= self.load_section(x, y, z);
        }
    }

    /// Drops the render sections of the column at (x, z).
    ///
    /// # Panics
    /// Panics if the column was never added.
    pub fn on_chunk_removed(&mut self, x: i32, z: i32) {
        self.adjacency.on_chunk_unloaded(x, z);

        let (min_y, max_y) = self.section_y_range();
        for y in min_y..max_y {
            self.needs_update |= self.unload_section(x, y, z);
        }
    }

    fn section_y_range(&self) -> (i32, i32) {
        let world = self.world.get();
        (world.min_section_y(), world.max_section_y())
    }

    fn load_section(&mut self, x: i32, y: i32, z: i32) -> bool {
        let position = Point3::new(x, y, z);
        assert!(
            !self.section_map.contains_key(&position),
            "Chunk is already loaded: {:?}",
            position
        );

        let id = SectionId(self.sections.insert(RenderSection::new(position)));
        self.regions.create_region_for_chunk(position).add_chunk(id);
        self.section_map.insert(position, id);

        let empty = self
            .world
            .get()
            .get_section(position)
            .map_or(true, |section| section.is_empty());

        let section = &mut self.sections[id.0];
        if empty {
            section.set_data(ChunkRenderData::empty());
        } else {
            section.mark_for_update(ChunkUpdateType::INITIAL_BUILD);
        }

        self.connect_neighbor_nodes(id);

        true
    }

    fn unload_section(&mut self, x: i32, y: i32, z: i32) -> bool {
        let position = Point3::new(x, y, z);
        let id = self
            .section_map
            .remove(&position)
            .unwrap_or_else(|| panic!("Chunk is not loaded: {:?}", position));

        self.disconnect_neighbor_nodes(id);

        let Some(mut section) = self.sections.remove(id.0) else {
            panic!("Chunk {:?} has no render section", position);
        };

        for entity in section.data().global_block_entities() {
            self.global_block_entities.remove(entity);
        }

        section.delete();

        let region = self
            .regions
            .get_region_mut(section.region())
            .unwrap_or_else(|| panic!("Couldn't find region {:?}", section.region()));
        region.delete_chunk_meshes(section.chunk_id());
        region.remove_chunk(id);

        true
    }

    fn connect_neighbor_nodes(&mut self, id: SectionId) {
        let position = self.sections[id.0].position();

        for side in BlockSide::all() {
            let Some(&adj) = self.section_map.get(&(position + side.offset())) else {
                continue;
            };

            self.sections[adj.0].set_adjacent(side.opposite(), Some(id));
            self.sections[id.0].set_adjacent(side, Some(adj));
        }
    }

    fn disconnect_neighbor_nodes(&mut self, id: SectionId) {
        for side in BlockSide::all() {
            let Some(adj) = self.sections[id.0].adjacent(side) else {
                continue;
            };

            self.sections[adj.0].set_adjacent(side.opposite(), None);
            self.sections[id.0].set_adjacent(side, None);
        }
    }

    /// Marks the section for a rebuild. Sections near the camera, or `important` ones,
    /// are rebuilt before the next frame is drawn. Sections that never finished their
    /// first build are left alone.
    pub fn schedule_rebuild(&mut self, x: i32, y: i32, z: i32, important: bool) {
        if let Some(&id) = self.section_map.get(&Point3::new(x, y, z)) {
            let section = &mut self.sections[id.0];

            if section.is_built() {
                let nearby = section.squared_distance(self.camera) <= NEARBY_CHUNK_DISTANCE;

                if important || nearby {
                    section.mark_for_update(ChunkUpdateType::IMPORTANT_REBUILD);
                } else {
                    section.mark_for_update(ChunkUpdateType::REBUILD);
                }
            }
        }

        self.needs_update = true;
    }

    /// Draws one pass of the current lists through `backend`.
    ///
    /// Regions whose buffer is new or was replaced are announced with
    /// [`MeshBackend::upload`] first, and regions that no longer exist with
    /// [`MeshBackend::delete`]. Translucent passes are submitted back to front.
    pub fn render_layer(&mut self, pass: RenderPass, backend: &mut dyn MeshBackend) {
        self.sync_backend(backend);

        let lists = &self.terrain_lists;
        let pass_lists = lists.pass(pass);
        let reverse = pass.is_translucent();

        let mut order: Vec<usize> = (0..pass_lists.region_indices.len()).collect();
        if reverse {
            order.reverse();
        }

        for i in order {
            let region_index = pass_lists.region_indices[i];
            let key = lists.regions[region_index];

            let Some(region) = self.regions.get_region(key) else {
                continue;
            };
            let Some(resources) = region.resources() else {
                continue;
            };

            let mut per_section: Vec<(usize, &[ModelPart])> = Vec::new();
            let parts = &pass_lists.model_part_segments[i];
            let mut start = 0;
            for (&section_index, &count) in pass_lists.section_indices[i]
                .iter()
                .zip(&pass_lists.model_part_counts[i])
            {
                let end = start + count as usize;
                per_section.push((section_index, &parts[start..end]));
                start = end;
            }

            if reverse {
                per_section.reverse();
            }

            let commands: Vec<DrawCommand> = per_section
                .iter()
                .flat_map(|&(section_index, parts)| {
                    parts.iter().map(move |part| DrawCommand {
                        vertex_count: part.length,
                        instance_count: 1,
                        first_vertex: part.offset,
                        first_instance: section_index as u32,
                    })
                })
                .collect();

            let origin = region.origin();
            backend.render(
                pass,
                &RegionDrawBatch {
                    region: key,
                    buffer: resources.arena().buffer(),
                    camera_offset: Vector3::new(
                        self.camera.x - origin.x as f32,
                        self.camera.y - origin.y as f32,
                        self.camera.z - origin.z as f32,
                    ),
                    sections: &lists.section_coords[region_index],
                    commands: &commands,
                },
            );
        }
    }

    fn sync_backend(&mut self, backend: &mut dyn MeshBackend) {
        let regions = &self.regions;

        self.backend_buffers.retain(|key, _| {
            let alive = regions
                .get_region(*key)
                .and_then(RenderRegion::resources)
                .is_some();

            if !alive {
                backend.delete(*key);
            }

            alive
        });

        for region in regions.regions() {
            if let Some(resources) = region.resources() {
                let buffer = resources.arena().buffer();

                if self.backend_buffers.insert(region.key(), buffer) != Some(buffer) {
                    backend.upload(region.key(), buffer);
                }
            }
        }
    }

    /// Advances the tick counter of every visible tickable section.
    pub fn tick_visible_renders(&mut self) {
        for id in &self.tickable {
            if let Some(section) = self.sections.get_mut(id.0) {
                section.tick();
            }
        }
    }

    /// Whether the section was reached by the last visibility search.
    pub fn is_section_visible(&self, x: i32, y: i32, z: i32) -> bool {
        self.section_map
            .get(&Point3::new(x, y, z))
            .and_then(|id| self.sections.get(id.0))
            .is_some_and(|section| section.graph_info().last_visible_frame() == self.current_frame)
    }

    pub fn total_sections(&self) -> usize {
        self.regions.regions().map(RenderRegion::chunk_count).sum()
    }

    pub fn visible_chunk_count(&self) -> usize {
        self.render_list.len()
    }

    pub fn mark_graph_dirty(&mut self) {
        self.needs_update = true;
    }

    pub fn is_graph_dirty(&self) -> bool {
        self.needs_update
    }

    /// Stops the worker threads and releases every region buffer.
    pub fn destroy(&mut self) {
        self.reset_lists();
        self.terrain_lists.clear();
        self.regions.delete();

        if self.builder.is_running() {
            self.builder.shutdown();
        }
    }

    pub fn section_id(&self, position: Point3<i32>) -> Option<SectionId> {
        self.section_map.get(&position).copied()
    }

    pub fn section(&self, id: SectionId) -> Option<&RenderSection> {
        self.sections.get(id.0)
    }

    pub fn section_at(&self, position: Point3<i32>) -> Option<&RenderSection> {
        self.section_id(position).and_then(|id| self.section(id))
    }

    pub fn sections(&self) -> impl Iterator<Item = (SectionId, &RenderSection)> {
        self.sections.iter().map(|(index, section)| (SectionId(index), section))
    }

    pub fn render_list(&self) -> &ChunkRenderList {
        &self.render_list
    }

    pub fn chunk_lists(&self) -> &SortedChunkLists {
        &self.chunk_lists
    }

    pub fn terrain_lists(&self) -> &SortedTerrainLists {
        &self.terrain_lists
    }

    /// Sections queued for `update` during the last search.
    pub fn rebuild_queue_len(&self, update: ChunkUpdateType) -> usize {
        self.rebuild_queues[update as usize].len()
    }

    pub fn visible_block_entities(&self) -> &[BlockEntity] {
        &self.visible_block_entities
    }

    /// Block entities drawn regardless of their section's visibility.
    pub fn global_block_entities(&self) -> &HashSet<BlockEntity> {
        &self.global_block_entities
    }

    pub fn regions(&self) -> &RenderRegionManager {
        &self.regions
    }

    pub fn builder(&self) -> &ChunkBuilder {
        &self.builder
    }

    pub fn current_frame(&self) -> i32 {
        self.current_frame
    }

    /// Lines for a debug overlay.
    pub fn debug_strings(&self) -> Vec<String> {
        const MIB: u64 = 1024 * 1024;

        vec![
            format!(
                "Device buffer objects: {}",
                self.regions.device_buffer_objects()
            ),
            format!(
                "Device memory: {}/{} MiB",
                self.regions.device_used_memory() / MIB,
                self.regions.device_allocated_memory() / MIB
            ),
            format!(
                "Chunk builder: P={} | A={} | I={}",
                self.builder.scheduled_job_count(),
                self.builder.busy_thread_count(),
                self.builder.total_thread_count()
            ),
            format!(
                "Chunk queues: U={} I={} R={}",
                self.rebuild_queue_len(ChunkUpdateType::REBUILD),
                self.rebuild_queue_len(ChunkUpdateType::IMPORTANT_REBUILD),
                self.rebuild_queue_len(ChunkUpdateType::INITIAL_BUILD)
            ),
            format!("Regions: {}", self.regions.region_count()),
        ]
    }
}

impl Drop for RenderSectionManager {
    fn drop(&mut self) {
        if self.builder.is_running() {
            self.destroy();
        }
    }
}
