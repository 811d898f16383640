use cgmath::{Point3, Vector3};

use crate::engine_state::rendering::Vertex;
use crate::engine_state::voxels::block::{block_side::BlockSide, Block};

/// Represents a single quad face of a voxel in the mesh.
///
/// A face is defined by four corner points (lower-left, lower-right, upper-right, upper-left)
/// wound counter-clockwise when seen from outside the block, together with the block type
/// and the side of the block it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    /// Lower-left corner of the face in section coordinates
    pub ll: Point3<i32>,
    /// Lower-right corner of the face in section coordinates
    pub lr: Point3<i32>,
    /// Upper-right corner of the face in section coordinates
    pub ur: Point3<i32>,
    /// Upper-left corner of the face in section coordinates
    pub ul: Point3<i32>,
    /// The block type as an integer, used for texture mapping
    pub block_type_int: usize,
    /// Which side of the block this face represents
    pub block_side: BlockSide,
}

impl Face {
    /// Creates a new face for a voxel at the given coordinates.
    ///
    /// # Arguments
    /// * `i`, `j`, `k` - The coordinates of the voxel in section space
    /// * `block_type_int` - The type of the block, used for texture mapping
    /// * `block_side` - Which side of the block this face represents
    ///
    /// # Returns
    /// A new `Face` whose corners lie on the plane of `block_side`.
    pub fn new(i: i32, j: i32, k: i32, block_type_int: usize, block_side: BlockSide) -> Self {
        let p = |x, y, z| Point3::new(i + x, j + y, k + z);

        let (ll, lr, ur, ul) = match block_side {
            BlockSide::BOTTOM => (p(0, 0, 0), p(1, 0, 0), p(1, 0, 1), p(0, 0, 1)),
            BlockSide::TOP => (p(0, 1, 0), p(0, 1, 1), p(1, 1, 1), p(1, 1, 0)),
            BlockSide::NORTH => (p(1, 0, 0), p(0, 0, 0), p(0, 1, 0), p(1, 1, 0)),
            BlockSide::SOUTH => (p(0, 0, 1), p(1, 0, 1), p(1, 1, 1), p(0, 1, 1)),
            BlockSide::WEST => (p(0, 0, 0), p(0, 0, 1), p(0, 1, 1), p(0, 1, 0)),
            BlockSide::EAST => (p(1, 0, 1), p(1, 0, 0), p(1, 1, 0), p(1, 1, 1)),
        };

        Face {
            ll,
            lr,
            ur,
            ul,
            block_type_int,
            block_side,
        }
    }

    /// Builds the quad's four vertices.
    ///
    /// # Arguments
    /// * `origin` - Offset of the section inside its region, in blocks
    pub fn to_vertices(&self, origin: Vector3<i32>) -> [Vertex; 4] {
        let texture = Block::get_texture_indices_from_int(self.block_type_int as u8)
            [self.block_side as usize];

        [
            Vertex::new(self.ll + origin, texture, 0, 0),
            Vertex::new(self.lr + origin, texture, 1, 0),
            Vertex::new(self.ur + origin, texture, 1, 1),
            Vertex::new(self.ul + origin, texture, 0, 1),
        ]
    }
}
