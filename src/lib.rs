#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Terrain
//!
//! A terrain streaming core for voxel worlds: it turns loaded chunk sections into GPU
//! geometry on background threads, keeps that geometry packed in per-region vertex
//! arenas and decides every frame which sections are worth drawing.
//!
//! ## Key Modules
//!
//! * `core` - Shared-ownership primitives used throughout the crate
//! * `engine_state` - The terrain core: device abstraction, sections, regions,
//!   visibility, meshing and the worker pool
//!
//! ## Architecture
//!
//! The crate never owns a window or a render pipeline. The host:
//! * implements or reuses a [`GpuDevice`](engine_state::buffer_state::GpuDevice)
//!   (`WgpuDevice` and `HeadlessDevice` are provided)
//! * exposes its block data through [`WorldView`](engine_state::voxels::WorldView)
//! * drives a [`TerrainRenderer`](engine_state::TerrainRenderer) once per frame
//! * draws what it is handed through a [`MeshBackend`](engine_state::rendering::MeshBackend)
//!
//! ## Usage
//!
//! ```no_run
//! use voxel_terrain::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     voxel_terrain::init_logger();
//!
//!     let world = MtResource::new(VoxelWorld::new(1, -4, 20));
//!     let device = share_device(&StResource::new(HeadlessDevice::new()));
//!     let mut renderer = TerrainRenderer::new(device, share_world(&world), TerrainConfig::default())?;
//!
//!     world.get_mut().generate_column(0, 0);
//!     renderer.on_chunk_added(0, 0);
//!
//!     let camera = ChunkCamera::at(cgmath::Point3::new(8.0, 80.0, 8.0));
//!     let mut backend = DrawCommandRecorder::new();
//!
//!     renderer.increment_frame();
//!     renderer.update_chunks(&camera, &Frustum::unbounded(), 128.0, false);
//!     for pass in RenderPass::all() {
//!         renderer.render_layer(pass, &mut backend);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Performance Considerations
//!
//! * Sections are meshed off the render thread with per-thread scratch buffers
//! * All sections of a region share one buffer, compacted when it fragments
//! * Visibility is a single breadth-first walk bounded by occlusion and the frustum

pub mod core;
pub mod engine_state;

/// The types a host needs to drive a [`TerrainRenderer`](engine_state::TerrainRenderer).
pub mod prelude {
    pub use crate::core::{MtResource, StResource};
    pub use crate::engine_state::buffer_state::{share_device, DeviceHandle, GpuDevice, HeadlessDevice};
    pub use crate::engine_state::camera_state::{ChunkCamera, Frustum};
    pub use crate::engine_state::config::TerrainConfig;
    pub use crate::engine_state::rendering::{DrawCommandRecorder, MeshBackend, RenderPass};
    pub use crate::engine_state::voxels::{share_world, VoxelWorld, WorldView};
    pub use crate::engine_state::TerrainRenderer;
}

/// Routes `log` output to stdout, filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls do nothing.
pub fn init_logger() {
    let mut log_builder = env_logger::Builder::new();
    let initialized = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init()
        .is_ok();

    if initialized {
        log::info!("Logger initialized");
    }
}
