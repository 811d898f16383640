//! Face-to-face visibility through a section.
//!
//! Two faces of a section are connected if some path of non-opaque blocks links them.
//! The visibility graph uses this to avoid walking into neighbours that could only be
//! seen through solid terrain.

use bitvec::prelude::BitVec;

use crate::engine_state::voxels::block::block_side::BlockSide;
use crate::engine_state::voxels::chunk::{ChunkSection, CHUNK_DIMENSION, CHUNK_SIZE};

/// Sections with fewer opaque blocks than this are treated as open on every face.
const MIN_OPAQUE_BLOCKS: usize = 256;

/// Bit `(from << 3) + to` is set if `to` can be seen when entering through `from`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ChunkOcclusionData {
    visibility: u64,
}

impl ChunkOcclusionData {
    /// Every face sees every other face.
    pub fn all_open() -> Self {
        let mut data = Self::default();
        data.add_open_edge_faces(0b11_1111);
        data
    }

    /// No face sees any other.
    pub fn all_closed() -> Self {
        Self::default()
    }

    fn bit(from: BlockSide, to: BlockSide) -> u64 {
        1 << (((from as u32) << 3) + to as u32)
    }

    pub fn is_visible_through(&self, from: BlockSide, to: BlockSide) -> bool {
        self.visibility & Self::bit(from, to) != 0
    }

    pub fn set_visible_through(&mut self, from: BlockSide, to: BlockSide, visible: bool) {
        if visible {
            self.visibility |= Self::bit(from, to);
        } else {
            self.visibility &= !Self::bit(from, to);
        }
    }

    /// Connects every pair of faces in `faces` (a [`BlockSide::bit`] mask).
    pub fn add_open_edge_faces(&mut self, faces: u8) {
        for from in BlockSide::all() {
            if faces & from.bit() == 0 {
                continue;
            }

            for to in BlockSide::all() {
                if faces & to.bit() != 0 {
                    self.set_visible_through(from, to, true);
                }
            }
        }
    }

    /// The raw bitset, in the layout the graph stores it in.
    pub fn bits(&self) -> u64 {
        self.visibility
    }
}

/// Flood fills the non-opaque blocks of a section to find which faces connect.
pub struct ChunkOcclusionDataBuilder {
    closed: BitVec,
    open_count: usize,
}

impl ChunkOcclusionDataBuilder {
    /// Starts from the opacity of `section`.
    pub fn new(section: &ChunkSection) -> Self {
        let closed = section.opacity_mask().clone();
        let open_count = CHUNK_SIZE as usize - closed.count_ones();

        Self { closed, open_count }
    }

    pub fn build(mut self) -> ChunkOcclusionData {
        let total = CHUNK_SIZE as usize;
        let mut data = ChunkOcclusionData::default();

        if total - self.open_count < MIN_OPAQUE_BLOCKS {
            return ChunkOcclusionData::all_open();
        }

        if self.open_count == 0 {
            return data;
        }

        let mut stack = Vec::with_capacity(total);
        for index in edge_indices() {
            if !self.closed[index] {
                let faces = self.flood(index, &mut stack);
                data.add_open_edge_faces(faces);
            }
        }

        data
    }

    /// Visits every open block connected to `start`, closing them as it goes, and
    /// returns the faces the filled region touches.
    fn flood(&mut self, start: usize, stack: &mut Vec<usize>) -> u8 {
        let mut faces = 0;

        self.closed.set(start, true);
        stack.push(start);

        while let Some(index) = stack.pop() {
            let position = ChunkSection::position_of(index);
            let coordinates = [position.x as i32, position.y as i32, position.z as i32];

            for side in BlockSide::all() {
                let offset = side.offset();
                let (x, y, z) = (
                    coordinates[0] + offset.x,
                    coordinates[1] + offset.y,
                    coordinates[2] + offset.z,
                );

                if !(0..CHUNK_DIMENSION).contains(&x)
                    || !(0..CHUNK_DIMENSION).contains(&y)
                    || !(0..CHUNK_DIMENSION).contains(&z)
                {
                    faces |= side.bit();
                    continue;
                }

                let neighbor = ChunkSection::index_of(x as usize, y as usize, z as usize);
                if !self.closed[neighbor] {
                    self.closed.set(neighbor, true);
                    stack.push(neighbor);
                }
            }
        }

        faces
    }
}

fn edge_indices() -> impl Iterator<Item = usize> {
    let last = CHUNK_DIMENSION as usize - 1;

    (0..CHUNK_SIZE as usize).filter(move |&index| {
        let p = ChunkSection::position_of(index);
        p.x == 0 || p.y == 0 || p.z == 0 || p.x == last || p.y == last || p.z == last
    })
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::block::{block_type::BlockType, Block};

    fn wall_at_y(y: usize) -> ChunkSection {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        for x in 0..16 {
            for z in 0..16 {
                section.set_block(x, y, z, Block::new(BlockType::DIRT));
            }
        }
        section
    }

    #[test]
    fn empty_section_is_open() {
        let section = ChunkSection::empty(Point3::new(0, 0, 0));
        let data = ChunkOcclusionDataBuilder::new(&section).build();
        assert_eq!(data, ChunkOcclusionData::all_open());
    }

    #[test]
    fn solid_section_is_closed() {
        let section = ChunkSection::filled(Point3::new(0, 0, 0), BlockType::DIRT);
        let data = ChunkOcclusionDataBuilder::new(&section).build();
        assert_eq!(data, ChunkOcclusionData::all_closed());
    }

    #[test]
    fn horizontal_wall_separates_top_from_bottom() {
        let data = ChunkOcclusionDataBuilder::new(&wall_at_y(8)).build();

        assert!(!data.is_visible_through(BlockSide::BOTTOM, BlockSide::TOP));
        assert!(!data.is_visible_through(BlockSide::TOP, BlockSide::BOTTOM));
        assert!(data.is_visible_through(BlockSide::NORTH, BlockSide::SOUTH));
        assert!(data.is_visible_through(BlockSide::TOP, BlockSide::EAST));
        assert!(data.is_visible_through(BlockSide::BOTTOM, BlockSide::WEST));
    }

    #[test]
    fn hole_in_wall_connects_both_sides() {
        let mut section = wall_at_y(8);
        section.set_block(4, 8, 4, Block::AIR);

        let data = ChunkOcclusionDataBuilder::new(&section).build();
        assert!(data.is_visible_through(BlockSide::BOTTOM, BlockSide::TOP));
    }
}
