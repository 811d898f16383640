//! # Engine State Module
//!
//! The terrain core: everything between "a column of block data was loaded" and "these
//! ranges of this buffer should be drawn".
//!
//! ## Key Components
//!
//! * `TerrainRenderer` - The context object a frame loop drives
//! * `buffer_state` - GPU device abstraction, vertex arenas and the buffer pool
//! * `camera_state` - Camera, projection and frustum
//! * `rendering` - Sections, regions, visibility, meshing and draw lists
//! * `task_management` - The worker pool building section meshes
//! * `voxels` - Block data, the world view and the chunk tracker
//!
//! ## Architecture
//!
//! The `TerrainRenderer` owns the [`RenderSectionManager`] and the [`ChunkTracker`].
//! There is no global renderer instance: the host creates one, feeds it chunk events
//! and camera state, and asks it to draw through a [`MeshBackend`].
//!
//! A frame looks like:
//! 1. `increment_frame`
//! 2. `update_chunks` with the frame's camera and frustum
//! 3. `render_layer` once per [`RenderPass`]
//!
//! ## Performance Considerations
//!
//! * The visibility search only re-runs when the camera, the fog or the section graph
//!   changed
//! * Builds run on worker threads; only uploads and the search run on the caller's thread

pub mod buffer_state;
pub mod camera_state;
pub mod config;
pub mod rendering;
pub mod task_management;
pub mod voxels;

use cgmath::{Point3, Rad};

use buffer_state::DeviceHandle;
use camera_state::{ChunkCamera, Frustum};
use config::TerrainConfig;
use rendering::{BlockEntity, MeshBackend, RenderPass, RenderSectionManager};
use voxels::chunk::CHUNK_DIMENSION;
use voxels::{ChunkTracker, WorldView};

use crate::core::MtResource;

/// Camera state the visibility search was last run for.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LastCamera {
    position: Point3<f32>,
    pitch: Rad<f32>,
    yaw: Rad<f32>,
    fog_end: f32,
}

/// Streams terrain for one world.
///
/// # Examples
///
/// ```no_run
/// # use voxel_terrain::prelude::*;
/// # fn frame(renderer: &mut TerrainRenderer, camera: ChunkCamera, frustum: Frustum) {
/// let mut backend = DrawCommandRecorder::new();
///
/// renderer.increment_frame();
/// renderer.update_chunks(&camera, &frustum, 128.0, false);
///
/// for pass in RenderPass::all() {
///     renderer.render_layer(pass, &mut backend);
/// }
/// # }
/// ```
pub struct TerrainRenderer {
    section_manager: RenderSectionManager,
    chunk_tracker: ChunkTracker,
    world: MtResource<dyn WorldView>,
    device: DeviceHandle,
    config: TerrainConfig,
    frustum: Frustum,
    last_camera: Option<LastCamera>,
    frame_index: i32,
}

impl TerrainRenderer {
    /// Creates a renderer and starts its build threads.
    ///
    /// # Arguments
    ///
    /// * `device` - Where region buffers are allocated
    /// * `world` - Block data of the world being drawn
    /// * `config` - Render distance, culling switches and builder settings
    ///
    /// # Returns
    ///
    /// An error if the build threads could not be started.
    pub fn new(
        device: DeviceHandle,
        world: MtResource<dyn WorldView>,
        config: TerrainConfig,
    ) -> anyhow::Result<Self> {
        let section_manager = RenderSectionManager::new(device.clone(), world.clone(), &config)?;

        Ok(Self {
            section_manager,
            chunk_tracker: ChunkTracker::new(),
            world,
            device,
            config,
            frustum: Frustum::unbounded(),
            last_camera: None,
            frame_index: 0,
        })
    }

    /// Replaces the section manager with one built from `config` and re-adds every
    /// tracked column.
    pub fn reload(&mut self, config: TerrainConfig) -> anyhow::Result<()> {
        self.section_manager.destroy();
        self.section_manager = RenderSectionManager::new(self.device.clone(), self.world.clone(), &config)?;
        self.config = config;
        self.last_camera = None;

        let columns: Vec<_> = self.chunk_tracker.columns().collect();
        log::info!("Reloading terrain with {} tracked columns", columns.len());

        for column in columns {
            self.section_manager.on_chunk_added(column.x, column.y);
        }

        Ok(())
    }

    /// Prepares the frame: uploads finished builds, submits new ones and re-runs the
    /// visibility search if anything it depends on changed.
    ///
    /// # Arguments
    ///
    /// * `camera` - This frame's camera
    /// * `frustum` - This frame's view frustum
    /// * `fog_end` - Distance in blocks at which fog hides terrain completely
    /// * `spectator` - The camera may be inside solid blocks
    pub fn update_chunks(&mut self, camera: &ChunkCamera, frustum: &Frustum, fog_end: f32, spectator: bool) {
        self.frustum = *frustum;

        let current = LastCamera {
            position: camera.position,
            pitch: camera.pitch,
            yaw: camera.yaw,
            fog_end,
        };

        if self.last_camera != Some(current) {
            self.section_manager.mark_graph_dirty();
        }
        self.last_camera = Some(current);

        self.section_manager.set_fog_end(fog_end);
        self.section_manager.update_chunks();

        if self.section_manager.is_graph_dirty() {
            self.section_manager
                .update(camera, frustum, self.frame_index, spectator);
        }

        self.section_manager.tick_visible_renders();
    }

    /// Draws the visible sections of `pass`.
    pub fn render_layer(&mut self, pass: RenderPass, backend: &mut dyn MeshBackend) {
        self.section_manager.render_layer(pass, backend);
    }

    pub fn on_chunk_added(&mut self, x: i32, z: i32) {
        if self.chunk_tracker.load_chunk(x, z) {
            self.section_manager.on_chunk_added(x, z);
        }
    }

    pub fn on_chunk_light_added(&mut self, x: i32, z: i32) {
        self.chunk_tracker.on_light_data_added(x, z);
    }

    pub fn on_chunk_removed(&mut self, x: i32, z: i32) {
        if self.chunk_tracker.unload_chunk(x, z) {
            self.section_manager.on_chunk_removed(x, z);
        }
    }

    /// Whether the column and its eight neighbours all carry `flags`.
    pub fn does_chunk_have_flag(&self, x: i32, z: i32, flags: u8) -> bool {
        self.chunk_tracker.has_merged_flags(x, z, flags)
    }

    /// Whether any part of the box may be on screen.
    ///
    /// Boxes outside the world height are tested against the frustum directly. Other
    /// boxes are visible if any section they touch, padded by half a block, was reached
    /// by the last visibility search.
    pub fn is_box_visible(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        let (bottom, top) = {
            let world = self.world.get();
            (world.bottom_y() as f32, world.top_y() as f32)
        };

        if max.y < bottom + 0.5 || min.y > top - 0.5 {
            return self.frustum.contains_box(min, max);
        }

        let section = |value: f32| (value.floor() as i32).div_euclid(CHUNK_DIMENSION);

        let (min_x, min_y, min_z) = (section(min.x - 0.5), section(min.y - 0.5), section(min.z - 0.5));
        let (max_x, max_y, max_z) = (section(max.x + 0.5), section(max.y + 0.5), section(max.z + 0.5));

        for x in min_x..=max_x {
            for z in min_z..=max_z {
                for y in min_y..=max_y {
                    if self.section_manager.is_section_visible(x, y, z) {
                        return true;
                    }
                }
            }
        }

        false
    }

    /// Schedules rebuilds for every section touching the block box `[min, max]`.
    pub fn schedule_rebuild_for_block_area(&mut self, min: Point3<i32>, max: Point3<i32>, important: bool) {
        self.schedule_rebuild_for_chunks(
            Point3::new(min.x >> 4, min.y >> 4, min.z >> 4),
            Point3::new(max.x >> 4, max.y >> 4, max.z >> 4),
            important,
        );
    }

    /// Schedules rebuilds for every section in the inclusive section box `[min, max]`.
    pub fn schedule_rebuild_for_chunks(&mut self, min: Point3<i32>, max: Point3<i32>, important: bool) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.schedule_rebuild_for_chunk(x, y, z, important);
                }
            }
        }
    }

    pub fn schedule_rebuild_for_chunk(&mut self, x: i32, y: i32, z: i32, important: bool) {
        self.section_manager.schedule_rebuild(x, y, z, important);
    }

    pub fn increment_frame(&mut self) {
        self.frame_index += 1;
    }

    pub fn frame_index(&self) -> i32 {
        self.frame_index
    }

    /// No build is waiting for a worker.
    pub fn is_terrain_render_complete(&self) -> bool {
        self.section_manager.builder().is_build_queue_empty()
    }

    pub fn visible_block_entities(&self) -> &[BlockEntity] {
        self.section_manager.visible_block_entities()
    }

    pub fn global_block_entities(&self) -> impl Iterator<Item = &BlockEntity> {
        self.section_manager.global_block_entities().iter()
    }

    /// `C: visible/total`
    pub fn chunks_debug_string(&self) -> String {
        format!(
            "C: {}/{}",
            self.section_manager.visible_chunk_count(),
            self.section_manager.total_sections()
        )
    }

    pub fn debug_strings(&self) -> Vec<String> {
        self.section_manager.debug_strings()
    }

    pub fn section_manager(&self) -> &RenderSectionManager {
        &self.section_manager
    }

    pub fn chunk_tracker(&self) -> &ChunkTracker {
        &self.chunk_tracker
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }
}
