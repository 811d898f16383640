//! # World Module
//!
//! This module provides the `WorldView` trait through which the terrain core reads block
//! data, and `VoxelWorld`, the procedurally generated implementation used by the demo
//! binary and the tests.
//!
//! ## Architecture
//!
//! The world is stored as loaded columns of sections. Each section sits behind an `Arc`
//! so build tasks can snapshot their neighbourhood without copying block data; editing a
//! block copies the section on write (`Arc::make_mut`) so snapshots already handed to
//! worker threads never change underneath them.
//!
//! ## Performance Considerations
//!
//! - Column lookup is O(1) using a hash map
//! - Snapshots are 27 `Arc` clones, taken on the main thread

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use cgmath::{Point2, Point3};

use crate::core::MtResource;

use super::block::Block;
use super::chunk::{ChunkGenerator, ChunkSection, CHUNK_DIMENSION};

/// Read access to block data, shared with build tasks as `MtResource<dyn WorldView>`.
pub trait WorldView: Send + Sync {
    /// The section at `position` (section coordinates), if its column is loaded and the
    /// position lies inside the world height.
    fn get_section(&self, position: Point3<i32>) -> Option<Arc<ChunkSection>>;

    /// Lowest section Y coordinate of the world.
    fn min_section_y(&self) -> i32;

    /// One past the highest section Y coordinate of the world.
    fn max_section_y(&self) -> i32;

    /// Whether the column at section coordinates (x, z) is loaded.
    fn is_column_loaded(&self, x: i32, z: i32) -> bool;

    /// The block at a world block position. Unloaded positions read as air.
    fn get_block(&self, position: Point3<i32>) -> Block {
        let section = Point3::new(position.x >> 4, position.y >> 4, position.z >> 4);

        self.get_section(section)
            .map(|s| {
                s.get_block(
                    (position.x & 15) as usize,
                    (position.y & 15) as usize,
                    (position.z & 15) as usize,
                )
            })
            .unwrap_or(Block::AIR)
    }

    /// Lowest block Y coordinate of the world.
    fn bottom_y(&self) -> i32 {
        self.min_section_y() * CHUNK_DIMENSION
    }

    /// One past the highest block Y coordinate of the world.
    fn top_y(&self) -> i32 {
        self.max_section_y() * CHUNK_DIMENSION
    }
}

/// Hands out a `dyn WorldView` handle to a world while the caller keeps its typed
/// handle for loading columns and editing blocks.
pub fn share_world<W: WorldView + 'static>(world: &MtResource<W>) -> MtResource<dyn WorldView> {
    world.share_as(|world| world as Arc<RwLock<dyn WorldView>>)
}

/// A world made of generated columns.
pub struct VoxelWorld {
    generator: ChunkGenerator,
    columns: HashMap<Point2<i32>, Vec<Arc<ChunkSection>>>,
    min_section_y: i32,
    max_section_y: i32,
}

impl VoxelWorld {
    /// Creates an empty world spanning sections `[min_section_y, max_section_y)`.
    ///
    /// # Panics
    /// Panics if the range is empty.
    pub fn new(seed: u32, min_section_y: i32, max_section_y: i32) -> Self {
        assert!(
            min_section_y < max_section_y,
            "World height range {}..{} is empty",
            min_section_y,
            max_section_y
        );

        VoxelWorld {
            generator: ChunkGenerator::new(seed),
            columns: HashMap::new(),
            min_section_y,
            max_section_y,
        }
    }

    /// Generates and loads the column at (x, z). Returns `false` if it was already loaded.
    pub fn generate_column(&mut self, x: i32, z: i32) -> bool {
        let generator = self.generator.clone();
        self.load_column_with(x, z, |position| generator.generate(position))
    }

    /// Loads the column at (x, z), asking `create` for each of its sections. Returns
    /// `false` if it was already loaded.
    pub fn load_column_with(
        &mut self,
        x: i32,
        z: i32,
        mut create: impl FnMut(Point3<i32>) -> ChunkSection,
    ) -> bool {
        let key = Point2::new(x, z);
        if self.columns.contains_key(&key) {
            return false;
        }

        let sections = (self.min_section_y..self.max_section_y)
            .map(|y| Arc::new(create(Point3::new(x, y, z))))
            .collect();

        self.columns.insert(key, sections);
        true
    }

    /// Unloads the column at (x, z). Returns `false` if it was not loaded.
    pub fn unload_column(&mut self, x: i32, z: i32) -> bool {
        self.columns.remove(&Point2::new(x, z)).is_some()
    }

    /// Replaces a block. Returns the position of the section that changed, or `None` if
    /// the position is not loaded.
    pub fn set_block(&mut self, position: Point3<i32>, block: Block) -> Option<Point3<i32>> {
        let section_pos = Point3::new(position.x >> 4, position.y >> 4, position.z >> 4);
        let index = self.section_index(section_pos.y)?;

        let column = self
            .columns
            .get_mut(&Point2::new(section_pos.x, section_pos.z))?;

        Arc::make_mut(&mut column[index]).set_block(
            (position.x & 15) as usize,
            (position.y & 15) as usize,
            (position.z & 15) as usize,
            block,
        );

        Some(section_pos)
    }

    pub fn loaded_columns(&self) -> impl Iterator<Item = Point2<i32>> + '_ {
        self.columns.keys().copied()
    }

    pub fn generator(&self) -> &ChunkGenerator {
        &self.generator
    }

    fn section_index(&self, y: i32) -> Option<usize> {
        (self.min_section_y..self.max_section_y)
            .contains(&y)
            .then(|| (y - self.min_section_y) as usize)
    }
}

impl WorldView for VoxelWorld {
    fn get_section(&self, position: Point3<i32>) -> Option<Arc<ChunkSection>> {
        let index = self.section_index(position.y)?;

        self.columns
            .get(&Point2::new(position.x, position.z))
            .map(|column| column[index].clone())
    }

    fn min_section_y(&self) -> i32 {
        self.min_section_y
    }

    fn max_section_y(&self) -> i32 {
        self.max_section_y
    }

    fn is_column_loaded(&self, x: i32, z: i32) -> bool {
        self.columns.contains_key(&Point2::new(x, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn edits_do_not_touch_snapshots() {
        let mut world = VoxelWorld::new(0, 0, 2);
        world.load_column_with(0, 0, ChunkSection::empty);

        let snapshot = world.get_section(Point3::new(0, 1, 0)).unwrap();
        let changed = world.set_block(Point3::new(3, 20, 5), Block::new(BlockType::DIRT));

        assert_eq!(changed, Some(Point3::new(0, 1, 0)));
        assert!(snapshot.is_empty());
        assert_eq!(
            world.get_block(Point3::new(3, 20, 5)),
            Block::new(BlockType::DIRT)
        );
    }

    #[test]
    fn positions_outside_the_world_are_air() {
        let mut world = VoxelWorld::new(0, 0, 1);
        world.load_column_with(0, 0, |p| ChunkSection::filled(p, BlockType::DIRT));

        assert!(world.get_section(Point3::new(0, 1, 0)).is_none());
        assert_eq!(world.get_block(Point3::new(0, -1, 0)), Block::AIR);
        assert_eq!(world.get_block(Point3::new(-1, 0, 0)), Block::AIR);
        assert!(world.set_block(Point3::new(0, 16, 0), Block::AIR).is_none());
    }
}
