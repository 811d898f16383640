//! Vertex data structures and layouts for terrain rendering.
//!
//! This module defines the vertex format terrain meshes are uploaded in.

use cgmath::Point3;

/// A vertex in the terrain pipeline.
///
/// Positions are relative to the origin of the region the vertex is stored in, which
/// keeps them small enough for `f32` precision anywhere in the world. The draw-call
/// issuer adds the region origin back in the vertex shader.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Texture Index: u32 (4 bytes)
/// - Texture Coordinates: [u16; 2] (4 bytes)
///
/// Total size: 20 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position relative to the region origin
    pub position: [f32; 3],
    /// Index of the texture in the texture array
    pub texture_index: u32,
    /// Texture coordinates in whole texture repeats
    pub tex_coords: [u16; 2],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// Creates a new vertex with the given parameters.
    ///
    /// # Arguments
    /// * `pos` - The position of the vertex relative to the region origin
    /// * `texture_index` - Index of the texture in the texture array
    /// * `u` - U texture coordinate
    /// * `v` - V texture coordinate
    ///
    /// # Returns
    /// A new `Vertex` instance
    pub fn new(pos: Point3<i32>, texture_index: usize, u: u16, v: u16) -> Self {
        Vertex {
            position: [pos.x as f32, pos.y as f32, pos.z as f32],
            texture_index: texture_index as u32,
            tex_coords: [u, v],
        }
    }

    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: texture_index (u32)
    /// - `location = 2`: tex_coords (vec2<u32>)
    #[cfg(not(target_family = "wasm"))]
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Uint32,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[u32; 4]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Uint16x2,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_copy_aligned() {
        assert_eq!(Vertex::STRIDE, 20);
        assert_eq!(Vertex::STRIDE % 4, 0);
    }

    #[cfg(not(target_family = "wasm"))]
    #[test]
    fn layout_covers_the_whole_vertex() {
        let layout = Vertex::desc();
        let last = layout.attributes.last().unwrap();

        assert_eq!(layout.array_stride, Vertex::STRIDE as u64);
        assert_eq!(last.offset + last.format.size(), layout.array_stride);
    }
}
