//! # Terrain Demo
//!
//! Streams a generated world around a camera flying in a slow circle and draws every
//! frame into a command recorder. Useful to watch the build pipeline and the region
//! allocator work without a window.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- [config.json] [--wgpu]
//! ```
//!
//! `--wgpu` allocates region buffers on a real (headless) wgpu device instead of the
//! in-memory one.

use std::collections::HashSet;

use anyhow::Context;
use cgmath::{Deg, Point2, Point3, Rad};
use log::info;

use voxel_terrain::core::{MtResource, StResource};
use voxel_terrain::engine_state::buffer_state::{share_device, DeviceHandle, HeadlessDevice};
use voxel_terrain::engine_state::camera_state::{Camera, CameraState, Projection};
use voxel_terrain::engine_state::config::TerrainConfig;
use voxel_terrain::engine_state::rendering::{DrawCommandRecorder, RenderPass};
use voxel_terrain::engine_state::voxels::block::{block_type::BlockType, Block};
use voxel_terrain::engine_state::voxels::{share_world, VoxelWorld};
use voxel_terrain::engine_state::TerrainRenderer;

const FRAMES: i32 = 600;
const FOG_END: f32 = 160.0;
const WORLD_SEED: u32 = 1337;

fn main() -> anyhow::Result<()> {
    voxel_terrain::init_logger();

    let mut config_path = None;
    let mut use_wgpu = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--wgpu" => use_wgpu = true,
            path => config_path = Some(path.to_string()),
        }
    }

    let config = match config_path {
        Some(path) => TerrainConfig::load(&path)?,
        None => TerrainConfig::default(),
    };
    info!("{:?}", config);

    let device = create_device(use_wgpu)?;
    let world = MtResource::new(VoxelWorld::new(
        WORLD_SEED,
        config.min_section_y,
        config.max_section_y,
    ));

    let mut renderer = TerrainRenderer::new(device, share_world(&world), config.clone())
        .context("failed to start the terrain renderer")?;

    let mut camera_state = CameraState::new(
        Camera::new((0.0, 90.0, 0.0), Deg(0.0), Deg(-20.0)),
        Projection::new(1280, 720, Deg(70.0), 0.1, 1000.0),
    );

    let mut backend = DrawCommandRecorder::new();
    let mut loaded: HashSet<Point2<i32>> = HashSet::new();
    let started = web_time::Instant::now();
    let mut slowest = web_time::Duration::ZERO;

    for frame in 0..FRAMES {
        let frame_start = web_time::Instant::now();

        camera_state
            .camera
            .advance(2.0, 0.0, 0.0, Rad(0.01), Rad(0.0));
        let camera = camera_state.chunk_camera();

        stream_columns(&mut renderer, &world, &mut loaded, camera.section_position, config.render_distance);

        if frame % 60 == 30 {
            let target = Point3::new(
                camera.block_position.x + fastrand::i32(-8..8),
                camera.block_position.y - 10,
                camera.block_position.z + fastrand::i32(-8..8),
            );

            if world.get_mut().set_block(target, Block::new(BlockType::CHEST)).is_some() {
                renderer.schedule_rebuild_for_block_area(target, target, false);
            }
        }

        renderer.increment_frame();
        renderer.update_chunks(&camera, &camera_state.frustum(), FOG_END, false);

        backend.clear();
        for pass in RenderPass::all() {
            renderer.render_layer(pass, &mut backend);
        }

        slowest = slowest.max(frame_start.elapsed());

        if frame % 100 == 0 {
            info!(
                "Frame {}: {} | solid vertices {} | translucent vertices {}",
                frame,
                renderer.chunks_debug_string(),
                backend.vertex_count(RenderPass::SOLID),
                backend.vertex_count(RenderPass::TRANSLUCENT)
            );

            for line in renderer.debug_strings() {
                info!("  {}", line);
            }
        }
    }

    info!(
        "{} frames in {:?} (slowest {:?}), {} region buffers uploaded, {} deleted",
        FRAMES,
        started.elapsed(),
        slowest,
        backend.upload_count(),
        backend.delete_count()
    );

    Ok(())
}

fn create_device(use_wgpu: bool) -> anyhow::Result<DeviceHandle> {
    if use_wgpu {
        create_wgpu_device()
    } else {
        Ok(share_device(&StResource::new(HeadlessDevice::new())))
    }
}

cfg_if::cfg_if! {
    if #[cfg(not(target_family = "wasm"))] {
        fn create_wgpu_device() -> anyhow::Result<DeviceHandle> {
            use voxel_terrain::engine_state::buffer_state::WgpuDevice;

            let device = WgpuDevice::request_headless()?;
            Ok(share_device(&StResource::new(device)))
        }
    } else {
        fn create_wgpu_device() -> anyhow::Result<DeviceHandle> {
            anyhow::bail!("wgpu devices are not available on this target")
        }
    }
}

/// Loads every column within one column of the render distance and unloads those that
/// drifted two columns past it.
fn stream_columns(
    renderer: &mut TerrainRenderer,
    world: &MtResource<VoxelWorld>,
    loaded: &mut HashSet<Point2<i32>>,
    center: Point3<i32>,
    render_distance: i32,
) {
    let load_radius = render_distance + 1;

    for x in center.x - load_radius..=center.x + load_radius {
        for z in center.z - load_radius..=center.z + load_radius {
            let column = Point2::new(x, z);
            if loaded.insert(column) {
                world.get_mut().generate_column(x, z);
                renderer.on_chunk_added(x, z);
                renderer.on_chunk_light_added(x, z);
            }
        }
    }

    let unload_radius = render_distance + 2;
    loaded.retain(|column| {
        let keep = (column.x - center.x).abs() <= unload_radius
            && (column.y - center.z).abs() <= unload_radius;

        if !keep {
            renderer.on_chunk_removed(column.x, column.y);
            world.get_mut().unload_column(column.x, column.y);
        }

        keep
    });
}
