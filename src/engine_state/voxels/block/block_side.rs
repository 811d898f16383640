//! # Block Side Module
//!
//! This module defines the six faces of a voxel block. The same enum names the six
//! directions of the section neighbor graph, so its discriminants double as indices
//! into per-direction arrays and bit positions in direction masks.

use cgmath::Vector3;

/// Represents the six possible faces of a voxel block.
///
/// Each variant is assigned a unique integer value used as an array index and as a bit
/// position in direction masks.
///
/// The order is: [BOTTOM, TOP, NORTH, SOUTH, WEST, EAST]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum BlockSide {
    /// The bottom face (facing negative Y)
    BOTTOM = 0,

    /// The top face (facing positive Y)
    TOP = 1,

    /// The north face (facing negative Z)
    NORTH = 2,

    /// The south face (facing positive Z)
    SOUTH = 3,

    /// The west face (facing negative X)
    WEST = 4,

    /// The east face (facing positive X)
    EAST = 5,
}

/// Number of block faces.
pub const SIDE_COUNT: usize = 6;

impl BlockSide {
    /// Returns an array containing all six block faces in discriminant order.
    ///
    /// # Returns
    /// An array containing all `BlockSide` variants.
    pub const fn all() -> [BlockSide; 6] {
        [
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::NORTH,
            BlockSide::SOUTH,
            BlockSide::WEST,
            BlockSide::EAST,
        ]
    }

    /// Looks a side up by its discriminant.
    pub fn from_index(index: usize) -> Option<BlockSide> {
        Self::all().get(index).copied()
    }

    /// The face pointing the other way along the same axis.
    pub const fn opposite(self) -> BlockSide {
        match self {
            BlockSide::BOTTOM => BlockSide::TOP,
            BlockSide::TOP => BlockSide::BOTTOM,
            BlockSide::NORTH => BlockSide::SOUTH,
            BlockSide::SOUTH => BlockSide::NORTH,
            BlockSide::WEST => BlockSide::EAST,
            BlockSide::EAST => BlockSide::WEST,
        }
    }

    /// Unit step in block or section coordinates.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            BlockSide::BOTTOM => Vector3::new(0, -1, 0),
            BlockSide::TOP => Vector3::new(0, 1, 0),
            BlockSide::NORTH => Vector3::new(0, 0, -1),
            BlockSide::SOUTH => Vector3::new(0, 0, 1),
            BlockSide::WEST => Vector3::new(-1, 0, 0),
            BlockSide::EAST => Vector3::new(1, 0, 0),
        }
    }

    /// Bit for this side in a direction mask.
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }
}
