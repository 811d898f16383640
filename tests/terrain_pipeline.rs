use std::time::Duration;

use cgmath::Point3;

use voxel_terrain::core::{MtResource, StResource};
use voxel_terrain::engine_state::buffer_state::{share_device, BufferHandle, GpuDevice, HeadlessDevice};
use voxel_terrain::engine_state::camera_state::{ChunkCamera, Frustum};
use voxel_terrain::engine_state::config::TerrainConfig;
use voxel_terrain::engine_state::rendering::region::RegionKey;
use voxel_terrain::engine_state::rendering::{ChunkUpdateType, MeshBackend, RenderPass, Vertex};
use voxel_terrain::engine_state::rendering::backend::RegionDrawBatch;
use voxel_terrain::engine_state::voxels::block::block_side::BlockSide;
use voxel_terrain::engine_state::voxels::block::{block_type::BlockType, Block};
use voxel_terrain::engine_state::voxels::chunk::ChunkSection;
use voxel_terrain::engine_state::voxels::{share_world, VoxelWorld};
use voxel_terrain::engine_state::TerrainRenderer;

/// Checks every draw against the buffer it names and reads back its first vertex.
struct CheckingBackend {
    device: StResource<HeadlessDevice>,
    draws: usize,
    vertices: u64,
}

impl MeshBackend for CheckingBackend {
    fn upload(&mut self, _region: RegionKey, _buffer: BufferHandle) {}

    fn render(&mut self, _pass: RenderPass, batch: &RegionDrawBatch<'_>) {
        let device = self.device.get();
        let allocated = device
            .analytics()
            .get(batch.buffer)
            .map(|analytics| analytics.allocated_memory)
            .expect("draw names a deleted buffer");

        for command in batch.commands {
            let end = (command.first_vertex + command.vertex_count) as u64 * Vertex::STRIDE as u64;
            assert!(end <= allocated, "draw past the end of {:?}", batch.buffer);
            assert!((command.first_instance as usize) < batch.sections.len());

            let bytes = device
                .read_buffer(
                    batch.buffer,
                    command.first_vertex as u64 * Vertex::STRIDE as u64,
                    Vertex::STRIDE as u64,
                )
                .unwrap();
            let vertex: Vertex = bytemuck::pod_read_unaligned(&bytes);

            // positions are relative to the region: 8x4x8 sections of 16 blocks
            assert!((0.0..=128.0).contains(&vertex.position[0]));
            assert!((0.0..=64.0).contains(&vertex.position[1]));
            assert!((0.0..=128.0).contains(&vertex.position[2]));

            self.draws += 1;
            self.vertices += command.vertex_count as u64;
        }
    }

    fn delete(&mut self, _region: RegionKey) {}
}

fn setup(min_y: i32, max_y: i32, config: TerrainConfig) -> (TerrainRenderer, MtResource<VoxelWorld>, StResource<HeadlessDevice>) {
    let world = MtResource::new(VoxelWorld::new(42, min_y, max_y));
    let device = StResource::new(HeadlessDevice::new());

    let renderer = TerrainRenderer::new(share_device(&device), share_world(&world), config).unwrap();
    (renderer, world, device)
}

fn add_column(renderer: &mut TerrainRenderer, world: &MtResource<VoxelWorld>, x: i32, z: i32, generate: bool) {
    if generate {
        world.get_mut().generate_column(x, z);
    } else {
        world.get_mut().load_column_with(x, z, ChunkSection::empty);
    }
    renderer.on_chunk_added(x, z);
}

/// Runs frames until no reachable section is waiting for a build and the builder is
/// idle.
fn settle(renderer: &mut TerrainRenderer, camera: &ChunkCamera) {
    let mut quiet_frames = 0;

    for _ in 0..5000 {
        renderer.increment_frame();
        renderer.update_chunks(camera, &Frustum::unbounded(), 1000.0, false);

        let manager = renderer.section_manager();
        let idle = manager.builder().is_build_queue_empty()
            && manager.builder().busy_thread_count() == 0
            && ChunkUpdateType::all()
                .into_iter()
                .all(|update| manager.rebuild_queue_len(update) == 0);

        quiet_frames = if idle { quiet_frames + 1 } else { 0 };
        if quiet_frames > 3 {
            return;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    panic!("builds did not settle");
}

#[test]
fn grid_neighbours_match_their_position() {
    let (mut renderer, world, _device) = setup(0, 3, TerrainConfig::default());

    for x in 0..3 {
        for z in 0..3 {
            add_column(&mut renderer, &world, x, z, false);
        }
    }

    let manager = renderer.section_manager();
    for x in 0..3 {
        for y in 0..3 {
            for z in 0..3 {
                let section = manager.section_at(Point3::new(x, y, z)).unwrap();
                let expected = [x, y, z].iter().filter(|c| **c == 1).count() + 3;
                let linked = BlockSide::all()
                    .into_iter()
                    .filter(|side| section.adjacent(*side).is_some())
                    .count();

                assert_eq!(linked, expected, "section {:?}", (x, y, z));
            }
        }
    }
}

#[test]
fn neighbour_links_stay_symmetric_across_unloads() {
    let (mut renderer, world, _device) = setup(0, 3, TerrainConfig::default());

    for x in 0..3 {
        for z in 0..3 {
            add_column(&mut renderer, &world, x, z, false);
        }
    }

    renderer.on_chunk_removed(1, 1);
    renderer.on_chunk_removed(0, 2);
    add_column(&mut renderer, &world, 1, 1, false);

    let manager = renderer.section_manager();
    for (id, section) in manager.sections() {
        for side in BlockSide::all() {
            if let Some(adjacent) = section.adjacent(side) {
                let other = manager.section(adjacent).expect("link to an unloaded section");
                assert_eq!(other.adjacent(side.opposite()), Some(id));
                assert_eq!(other.position(), section.position() + side.offset());
            }
        }
    }

    assert!(manager.section_at(Point3::new(0, 0, 2)).is_none());
    assert_eq!(manager.total_sections(), 8 * 3);
}

#[test]
fn generated_terrain_is_built_uploaded_and_drawn() {
    let config = TerrainConfig {
        render_distance: 2,
        builder_threads: 2,
        ..TerrainConfig::default()
    };
    let (mut renderer, world, device) = setup(0, 8, config);

    for x in -3..=3 {
        for z in -3..=3 {
            add_column(&mut renderer, &world, x, z, true);
        }
    }

    let camera = ChunkCamera::at(Point3::new(8.0, 110.0, 8.0));
    settle(&mut renderer, &camera);

    let manager = renderer.section_manager();
    assert!(manager.visible_chunk_count() > 0);
    assert!(manager.regions().device_used_memory() > 0);
    assert!(manager.regions().device_allocated_memory() >= manager.regions().device_used_memory());

    let mut backend = CheckingBackend {
        device: device.clone(),
        draws: 0,
        vertices: 0,
    };
    for pass in RenderPass::all() {
        renderer.render_layer(pass, &mut backend);
    }

    assert!(backend.draws > 0);
    // quads are four vertices each
    assert_eq!(backend.vertices % 4, 0);
}

#[test]
fn unloading_everything_releases_region_buffers() {
    let config = TerrainConfig {
        render_distance: 2,
        builder_threads: 2,
        ..TerrainConfig::default()
    };
    let (mut renderer, world, device) = setup(0, 8, config);

    for x in -1..=1 {
        for z in -1..=1 {
            add_column(&mut renderer, &world, x, z, true);
        }
    }

    let camera = ChunkCamera::at(Point3::new(8.0, 110.0, 8.0));
    settle(&mut renderer, &camera);
    assert!(renderer.section_manager().regions().region_count() > 0);

    for x in -1..=1 {
        for z in -1..=1 {
            renderer.on_chunk_removed(x, z);
        }
    }

    renderer.increment_frame();
    renderer.update_chunks(&camera, &Frustum::unbounded(), 1000.0, false);

    let manager = renderer.section_manager();
    assert_eq!(manager.total_sections(), 0);
    assert_eq!(manager.regions().region_count(), 0);
    assert_eq!(manager.regions().device_used_memory(), 0);
    assert_eq!(manager.visible_chunk_count(), 0);

    // pooled buffers may outlive their regions, live arenas may not
    assert!(device.get().buffer_count() <= manager.regions().device_buffer_objects());
}

#[test]
fn block_edits_near_the_camera_show_up_the_same_frame() {
    let config = TerrainConfig {
        render_distance: 2,
        builder_threads: 1,
        ..TerrainConfig::default()
    };
    let (mut renderer, world, _device) = setup(0, 2, config);

    for x in -2..=2 {
        for z in -2..=2 {
            add_column(&mut renderer, &world, x, z, false);
        }
    }

    let camera = ChunkCamera::at(Point3::new(8.0, 8.0, 8.0));
    settle(&mut renderer, &camera);
    assert_eq!(renderer.chunks_debug_string(), "C: 0/50");

    let target = Point3::new(3, 3, 3);
    world.get_mut().set_block(target, Block::new(BlockType::DIRT));
    renderer.schedule_rebuild_for_block_area(target, target, false);

    renderer.increment_frame();
    renderer.update_chunks(&camera, &Frustum::unbounded(), 1000.0, false);
    renderer.increment_frame();
    renderer.update_chunks(&camera, &Frustum::unbounded(), 1000.0, false);

    let section = renderer
        .section_manager()
        .section_at(Point3::new(0, 0, 0))
        .unwrap();
    assert!(!section.is_empty());
    assert_eq!(renderer.chunks_debug_string(), "C: 1/50");
}
