//! # Chunk Creation Module
//!
//! Procedural generation of chunk sections for the demo world and the tests.
//!
//! The surface height comes from 2D Perlin noise, caves are carved with 3D Perlin noise
//! where the noise falls inside a narrow band around zero, and empty cells below sea level are
//! flooded with water. A seeded random source sprinkles leaves and the occasional chest
//! on the surface so every render pass and block entities show up in generated terrain.

use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use crate::engine_state::voxels::block::{block_type::BlockType, Block};

use super::{ChunkSection, CHUNK_DIMENSION};

/// Cave noise inside `[-CAVE_BAND, CAVE_BAND]` carves the cell out.
pub const CAVE_BAND: f64 = 0.04;
/// Scaling factor applied to world coordinates when sampling cave noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;
/// Scaling factor applied to world coordinates when sampling the height map.
pub const HEIGHT_SCALE_FACTOR: f64 = 0.008;
/// Average surface height in blocks.
pub const BASE_HEIGHT: i32 = 64;
/// Maximum deviation from the average surface height.
pub const HEIGHT_VARIATION: f64 = 24.0;
/// Cells at or below this height that would be air are water.
pub const SEA_LEVEL: i32 = 60;

/// Deterministic terrain generator.
#[derive(Clone)]
pub struct ChunkGenerator {
    seed: u32,
    height: Perlin,
    caves: Perlin,
}

impl ChunkGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            height: Perlin::new(seed),
            caves: Perlin::new(seed.wrapping_add(1)),
        }
    }

    /// Surface height at a block column.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let sample = self.height.get([
            x as f64 * HEIGHT_SCALE_FACTOR,
            z as f64 * HEIGHT_SCALE_FACTOR,
        ]);
        BASE_HEIGHT + (sample * HEIGHT_VARIATION) as i32
    }

    /// Generates the section at `position` (section coordinates).
    pub fn generate(&self, position: Point3<i32>) -> ChunkSection {
        let mut section = ChunkSection::empty(position);
        let mut rng = fastrand::Rng::with_seed(self.section_seed(position));
        let origin = position * CHUNK_DIMENSION;

        for z in 0..CHUNK_DIMENSION {
            for x in 0..CHUNK_DIMENSION {
                let (bx, bz) = (origin.x + x, origin.z + z);
                let surface = self.surface_height(bx, bz);

                for y in 0..CHUNK_DIMENSION {
                    let by = origin.y + y;
                    let block_type = self.block_at(Point3::new(bx, by, bz), surface, &mut rng);

                    if block_type != BlockType::AIR {
                        section.set_block(x as usize, y as usize, z as usize, Block::new(block_type));
                    }
                }
            }
        }

        section
    }

    fn block_at(&self, position: Point3<i32>, surface: i32, rng: &mut fastrand::Rng) -> BlockType {
        if position.y > surface {
            return if position.y <= SEA_LEVEL {
                BlockType::WATER
            } else if position.y == surface + 1 && surface > SEA_LEVEL {
                Self::decoration(rng)
            } else {
                BlockType::AIR
            };
        }

        if self.is_cave(position) {
            return BlockType::AIR;
        }

        match surface - position.y {
            0 if surface >= SEA_LEVEL => BlockType::GRASS,
            0..=3 => BlockType::DIRT,
            _ => BlockType::WHITE,
        }
    }

    fn is_cave(&self, position: Point3<i32>) -> bool {
        let sample = self.caves.get(Self::to_perlin_pos(position, PERLIN_SCALE_FACTOR));
        (-CAVE_BAND..=CAVE_BAND).contains(&sample)
    }

    fn decoration(rng: &mut fastrand::Rng) -> BlockType {
        match rng.u16(..1000) {
            0 => BlockType::CHEST,
            1..=40 => BlockType::LEAVES,
            41..=45 => BlockType::GLASS,
            _ => BlockType::AIR,
        }
    }

    fn section_seed(&self, position: Point3<i32>) -> u64 {
        let mix = (position.x as i64 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (position.y as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ (position.z as i64 as u64).wrapping_mul(0x1656_67B1_9E37_79F9);
        mix ^ self.seed as u64
    }

    /// Converts world block coordinates to scaled noise coordinates.
    fn to_perlin_pos(pos: Point3<i32>, scale_factor: f64) -> [f64; 3] {
        [
            pos.x as f64 * scale_factor,
            pos.y as f64 * scale_factor,
            pos.z as f64 * scale_factor,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let generator = ChunkGenerator::new(3);
        let position = Point3::new(1, 3, -2);

        let a = generator.generate(position);
        let b = generator.generate(position);

        assert_eq!(a.block_count(), b.block_count());
        assert!(a.iter_blocks().eq(b.iter_blocks()));
    }

    #[test]
    fn sky_is_empty_and_bedrock_is_full() {
        let generator = ChunkGenerator::new(0);

        assert!(generator.generate(Point3::new(0, 12, 0)).is_empty());
        assert!(!generator.generate(Point3::new(0, 0, 0)).is_empty());
    }
}
