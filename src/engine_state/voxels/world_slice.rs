//! Immutable neighbourhood snapshots handed to build tasks.

use std::sync::Arc;

use cgmath::Point3;

use super::block::Block;
use super::chunk::{ChunkSection, CHUNK_DIMENSION};
use super::world::WorldView;

/// The section being built plus its 26 neighbours, captured on the main thread.
///
/// Local coordinates are relative to the centre section's origin and may range over
/// `-16..32` on each axis. Missing neighbours read as air.
pub struct WorldSlice {
    position: Point3<i32>,
    center: Arc<ChunkSection>,
    sections: [Option<Arc<ChunkSection>>; 27],
}

impl WorldSlice {
    /// Snapshots the neighbourhood of `position`. Returns `None` if the centre section is
    /// missing or empty, in which case there is nothing to build.
    pub fn prepare(world: &dyn WorldView, position: Point3<i32>) -> Option<WorldSlice> {
        let center = world.get_section(position)?;
        if center.is_empty() {
            return None;
        }

        let sections = std::array::from_fn(|i| {
            let (dx, dy, dz) = (i as i32 % 3 - 1, (i as i32 / 3) % 3 - 1, i as i32 / 9 - 1);
            if (dx, dy, dz) == (0, 0, 0) {
                Some(center.clone())
            } else {
                world.get_section(Point3::new(position.x + dx, position.y + dy, position.z + dz))
            }
        });

        Some(WorldSlice {
            position,
            center,
            sections,
        })
    }

    /// Section coordinates of the centre section.
    pub fn position(&self) -> Point3<i32> {
        self.position
    }

    /// The centre section.
    pub fn section(&self) -> &ChunkSection {
        &self.center
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Block {
        let (sx, lx) = Self::split(x);
        let (sy, ly) = Self::split(y);
        let (sz, lz) = Self::split(z);

        match &self.sections[(sx + 3 * sy + 9 * sz) as usize] {
            Some(section) => section.get_block(lx, ly, lz),
            None => Block::AIR,
        }
    }

    pub fn is_opaque(&self, x: i32, y: i32, z: i32) -> bool {
        self.get_block(x, y, z).is_opaque()
    }

    fn split(coordinate: i32) -> (i32, usize) {
        debug_assert!(
            (-CHUNK_DIMENSION..2 * CHUNK_DIMENSION).contains(&coordinate),
            "Coordinate {} is outside the slice",
            coordinate
        );
        (
            coordinate.div_euclid(CHUNK_DIMENSION) + 1,
            coordinate.rem_euclid(CHUNK_DIMENSION) as usize,
        )
    }
}
