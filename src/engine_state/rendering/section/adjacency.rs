//! Loaded-column bookkeeping for the render side.

use std::collections::HashSet;

use cgmath::Point2;

use crate::engine_state::voxels::block::block_side::BlockSide;

/// Columns the section manager has been told about.
///
/// A section is only built once the four columns around it are loaded, so its faces
/// along column borders are meshed against real neighbours instead of air.
#[derive(Debug, Default)]
pub struct ChunkAdjacencyMap {
    loaded: HashSet<Point2<i32>>,
}

impl ChunkAdjacencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_chunk_loaded(&mut self, x: i32, z: i32) {
        self.loaded.insert(Point2::new(x, z));
    }

    pub fn on_chunk_unloaded(&mut self, x: i32, z: i32) {
        self.loaded.remove(&Point2::new(x, z));
    }

    pub fn is_loaded(&self, x: i32, z: i32) -> bool {
        self.loaded.contains(&Point2::new(x, z))
    }

    /// Whether all four horizontal neighbours of column (x, z) are loaded.
    pub fn has_neighbors(&self, x: i32, z: i32) -> bool {
        [BlockSide::NORTH, BlockSide::SOUTH, BlockSide::WEST, BlockSide::EAST]
            .into_iter()
            .all(|side| {
                let offset = side.offset();
                self.is_loaded(x + offset.x, z + offset.z)
            })
    }
}
