//! # Camera State Management
//!
//! This module handles all camera-related functionality the terrain core needs:
//! - Camera position and orientation tracking
//! - View and projection matrix calculations
//! - Frustum extraction and box classification
//! - Chunk-relative camera coordinates for the visibility search
//!
//! ## Core Components
//! - `Camera`: Represents the camera's position and orientation in 3D space
//! - `Projection`: Manages the camera's projection matrix
//! - `Frustum`: The six clip planes, tested against section and region boxes
//! - `ChunkCamera`: The camera position split into block and section coordinates

use cgmath::{Point3, Rad};

use super::voxels::chunk::CHUNK_DIMENSION;

pub mod camera;
pub mod frustum;

pub use camera::{Camera, Projection};
pub use frustum::{Frustum, Visibility};

/// Camera and projection, the inputs every frame is driven by.
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    pub camera: Camera,
    pub projection: Projection,
}

impl CameraState {
    pub fn new(camera: Camera, projection: Projection) -> Self {
        Self { camera, projection }
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.projection.calc_matrix() * self.camera.calc_matrix())
    }

    pub fn chunk_camera(&self) -> ChunkCamera {
        ChunkCamera::new(
            self.camera.position,
            self.camera.pitch,
            self.camera.yaw,
        )
    }
}

/// Per-frame camera snapshot in the coordinate systems the visibility search uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkCamera {
    /// World position in blocks
    pub position: Point3<f32>,
    pub pitch: Rad<f32>,
    pub yaw: Rad<f32>,
    /// Block containing the camera
    pub block_position: Point3<i32>,
    /// Section containing the camera
    pub section_position: Point3<i32>,
}

impl ChunkCamera {
    pub fn new(position: Point3<f32>, pitch: Rad<f32>, yaw: Rad<f32>) -> Self {
        let block_position = Point3::new(
            position.x.floor() as i32,
            position.y.floor() as i32,
            position.z.floor() as i32,
        );

        Self {
            position,
            pitch,
            yaw,
            block_position,
            section_position: Point3::new(
                block_position.x.div_euclid(CHUNK_DIMENSION),
                block_position.y.div_euclid(CHUNK_DIMENSION),
                block_position.z.div_euclid(CHUNK_DIMENSION),
            ),
        }
    }

    /// Convenience for tests and callers without an orientation.
    pub fn at(position: Point3<f32>) -> Self {
        Self::new(position, Rad(0.0), Rad(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_positions_round_down() {
        let camera = ChunkCamera::at(Point3::new(-0.5, 15.9, -16.0));

        assert_eq!(camera.block_position, Point3::new(-1, 15, -16));
        assert_eq!(camera.section_position, Point3::new(-1, 0, -1));
    }
}
