//! # Frustum
//!
//! Six-plane view volume extracted from a view-projection matrix (Gribb/Hartmann).
//! Each plane is stored as `(nx, ny, nz, d)` with `n . p + d >= 0` meaning "inside",
//! normalised so `d` is a real distance.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector4};

/// Result of testing a box against the frustum.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    /// Completely outside.
    CULLED,
    /// Straddles at least one plane.
    VISIBLE,
    /// Completely inside every plane.
    FULLY_VISIBLE,
}

#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts the planes of `view_projection`.
    ///
    /// The matrix is expected to map depth to `[0, 1]` (wgpu convention, as produced by
    /// [`Projection::calc_matrix`](super::camera::Projection::calc_matrix)).
    pub fn from_matrix(view_projection: Matrix4<f32>) -> Self {
        let m = view_projection;
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
            let length = plane.truncate().magnitude();
            if length > 0.0 {
                plane / length
            } else {
                plane
            }
        });

        Self { planes }
    }

    /// A frustum that contains everything.
    pub fn unbounded() -> Self {
        Self {
            planes: [Vector4::new(0.0, 0.0, 0.0, 1.0); 6],
        }
    }

    /// Classifies the axis-aligned box `[min, max]`.
    pub fn test_box(&self, min: Point3<f32>, max: Point3<f32>) -> Visibility {
        let mut result = Visibility::FULLY_VISIBLE;

        for plane in &self.planes {
            // Corner furthest along the plane normal, and the one furthest against it
            let (far, near) = (
                Point3::new(
                    if plane.x >= 0.0 { max.x } else { min.x },
                    if plane.y >= 0.0 { max.y } else { min.y },
                    if plane.z >= 0.0 { max.z } else { min.z },
                ),
                Point3::new(
                    if plane.x >= 0.0 { min.x } else { max.x },
                    if plane.y >= 0.0 { min.y } else { max.y },
                    if plane.z >= 0.0 { min.z } else { max.z },
                ),
            );

            if Self::distance(plane, far) < 0.0 {
                return Visibility::CULLED;
            }

            if Self::distance(plane, near) < 0.0 {
                result = Visibility::VISIBLE;
            }
        }

        result
    }

    pub fn contains_box(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        self.test_box(min, max) != Visibility::CULLED
    }

    fn distance(plane: &Vector4<f32>, point: Point3<f32>) -> f32 {
        plane.x * point.x + plane.y * point.y + plane.z * point.z + plane.w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::camera_state::camera::{Camera, Projection};
    use cgmath::Deg;

    fn looking_down_positive_x() -> Frustum {
        let camera = Camera::new(Point3::new(0.0, 0.0, 0.0), Deg(0.0), Deg(0.0));
        let projection = Projection::new(1, 1, Deg(90.0), 0.1, 100.0);

        Frustum::from_matrix(projection.calc_matrix() * camera.calc_matrix())
    }

    #[test]
    fn classifies_boxes() {
        let frustum = looking_down_positive_x();

        assert_eq!(
            frustum.test_box(Point3::new(10.0, -1.0, -1.0), Point3::new(12.0, 1.0, 1.0)),
            Visibility::FULLY_VISIBLE
        );
        assert_eq!(
            frustum.test_box(Point3::new(-12.0, -1.0, -1.0), Point3::new(-10.0, 1.0, 1.0)),
            Visibility::CULLED
        );
        assert_eq!(
            frustum.test_box(Point3::new(90.0, -1.0, -1.0), Point3::new(110.0, 1.0, 1.0)),
            Visibility::VISIBLE
        );
    }

    #[test]
    fn unbounded_contains_everything() {
        let frustum = Frustum::unbounded();
        assert_eq!(
            frustum.test_box(Point3::new(-1e6, -1e6, -1e6), Point3::new(1e6, 1e6, 1e6)),
            Visibility::FULLY_VISIBLE
        );
    }
}
