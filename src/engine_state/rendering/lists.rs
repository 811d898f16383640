//! # Render Lists
//!
//! The visibility search produces a flat [`ChunkRenderList`] in traversal order, which
//! is nearest first. It is then grouped by region into [`SortedChunkLists`] and
//! flattened into [`SortedTerrainLists`], the tables a backend turns into draw calls.
//!
//! ## Performance Considerations
//! - Model parts facing away from the camera are dropped here, per section, using the
//!   section's bounds
//! - Tables are cleared and refilled every frame, keeping their allocations

use std::collections::HashMap;

use cgmath::Point3;
use thunderdome::Arena;

use super::data::{ChunkRenderBounds, ModelPart};
use super::region::{RegionKey, RenderRegionManager};
use super::section::{RenderSection, SectionId};
use super::{ChunkMeshFace, RenderPass};
use crate::engine_state::buffer_state::BufferSegment;

/// Visible, non-empty sections in the order the search reached them.
#[derive(Debug, Default)]
pub struct ChunkRenderList {
    sections: Vec<SectionId>,
}

impl ChunkRenderList {
    pub fn add(&mut self, section: SectionId) {
        self.sections.push(section);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = SectionId> + '_ {
        self.sections.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }
}

/// The visible sections of one region, in traversal order.
#[derive(Debug)]
pub struct RegionBucket {
    region: RegionKey,
    sections: Vec<SectionId>,
}

impl RegionBucket {
    pub fn region(&self) -> RegionKey {
        self.region
    }

    pub fn sections(&self) -> &[SectionId] {
        &self.sections
    }

    /// Sections front to back, or back to front if `reverse` is set.
    pub fn iter(&self, reverse: bool) -> Box<dyn Iterator<Item = SectionId> + '_> {
        let sections = self.sections.iter().copied();
        if reverse {
            Box::new(sections.rev())
        } else {
            Box::new(sections)
        }
    }
}

/// A render list grouped by region. Regions keep the order their first section was
/// reached in.
#[derive(Debug, Default)]
pub struct SortedChunkLists {
    buckets: Vec<RegionBucket>,
}

impl SortedChunkLists {
    pub fn new(list: &ChunkRenderList, sections: &Arena<RenderSection>) -> Self {
        let mut buckets: Vec<RegionBucket> = Vec::new();
        let mut index_of: HashMap<RegionKey, usize> = HashMap::new();

        for id in list.iter() {
            let Some(section) = sections.get(id.0) else {
                continue;
            };

            let index = *index_of.entry(section.region()).or_insert_with(|| {
                buckets.push(RegionBucket {
                    region: section.region(),
                    sections: Vec::new(),
                });
                buckets.len() - 1
            });

            buckets[index].sections.push(id);
        }

        Self { buckets }
    }

    /// Regions front to back, or back to front if `reverse` is set.
    pub fn iter(&self, reverse: bool) -> Box<dyn Iterator<Item = &RegionBucket> + '_> {
        if reverse {
            Box::new(self.buckets.iter().rev())
        } else {
            Box::new(self.buckets.iter())
        }
    }

    pub fn region_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn section_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.sections.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Draw tables of one pass. Every outer `Vec` has one entry per listed region.
#[derive(Debug, Default)]
pub struct PassLists {
    /// Indices into [`SortedTerrainLists::regions`]
    pub region_indices: Vec<usize>,
    /// Indices into the region's section tables
    pub section_indices: Vec<Vec<usize>>,
    /// Model parts drawn for each listed section
    pub model_part_counts: Vec<Vec<u32>>,
    /// The drawn parts, in vertices from the start of the region's buffer
    pub model_part_segments: Vec<Vec<ModelPart>>,
}

impl PassLists {
    fn clear(&mut self) {
        self.region_indices.clear();
        self.section_indices.clear();
        self.model_part_counts.clear();
        self.model_part_segments.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.region_indices.is_empty()
    }
}

/// Flattened draw tables for every visible region and pass.
#[derive(Debug, Default)]
pub struct SortedTerrainLists {
    /// Regions with at least one uploaded, visible section
    pub regions: Vec<RegionKey>,
    /// Per region, the arena allocation of each listed section
    pub uploaded_segments: Vec<Vec<BufferSegment>>,
    /// Per region, the section coordinates of each listed section
    pub section_coords: Vec<Vec<Point3<i32>>>,
    passes: [PassLists; RenderPass::COUNT],
}

impl SortedTerrainLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&self, pass: RenderPass) -> &PassLists {
        &self.passes[pass.index()]
    }

    pub fn clear(&mut self) {
        self.regions.clear();
        self.uploaded_segments.clear();
        self.section_coords.clear();

        for pass in &mut self.passes {
            pass.clear();
        }
    }

    /// Rebuilds the tables from this frame's sorted lists.
    ///
    /// # Arguments
    /// * `lists` - Visible sections grouped by region
    /// * `sections` - Every loaded section
    /// * `regions` - Where the sections' geometry lives
    /// * `camera` - Camera position in blocks
    /// * `block_face_culling` - Drop model parts that face away from the camera
    pub fn update(
        &mut self,
        lists: &SortedChunkLists,
        sections: &Arena<RenderSection>,
        regions: &RenderRegionManager,
        camera: Point3<f32>,
        block_face_culling: bool,
    ) {
        self.clear();

        for bucket in lists.iter(false) {
            let Some(resources) = regions.get_region(bucket.region()).and_then(|r| r.resources())
            else {
                continue;
            };

            let region_index = self.regions.len();
            let mut segments = Vec::new();
            let mut coords = Vec::new();
            let mut pass_sections: [Vec<usize>; RenderPass::COUNT] = Default::default();
            let mut pass_counts: [Vec<u32>; RenderPass::COUNT] = Default::default();
            let mut pass_parts: [Vec<ModelPart>; RenderPass::COUNT] = Default::default();

            for id in bucket.iter(false) {
                let Some(section) = sections.get(id.0) else {
                    continue;
                };

                let chunk_id = section.chunk_id();
                let Some(segment) = resources.geometry(chunk_id) else {
                    continue;
                };

                let section_index = segments.len();
                segments.push(segment);
                coords.push(section.position());

                let facing_mask = if block_face_culling {
                    visible_faces(camera, section.data().bounds())
                } else {
                    ChunkMeshFace::ALL_BITS
                };

                for pass in RenderPass::all() {
                    let Some(model) = resources.mesh(pass, chunk_id) else {
                        continue;
                    };

                    let bits = model.visibility_bits() & facing_mask;
                    if bits == 0 {
                        continue;
                    }

                    let parts = &mut pass_parts[pass.index()];
                    let before = parts.len();

                    let faces = ChunkMeshFace::all();
                    let ordered: Box<dyn Iterator<Item = &ChunkMeshFace>> = if pass.is_translucent() {
                        Box::new(faces.iter().rev())
                    } else {
                        Box::new(faces.iter())
                    };

                    for facing in ordered.filter(|facing| bits & facing.bit() != 0) {
                        if let Some(part) = model.part(*facing) {
                            parts.push(ModelPart {
                                offset: segment.offset + part.offset,
                                length: part.length,
                            });
                        }
                    }

                    pass_sections[pass.index()].push(section_index);
                    pass_counts[pass.index()].push((parts.len() - before) as u32);
                }
            }

            if segments.is_empty() {
                continue;
            }

            self.regions.push(bucket.region());
            self.uploaded_segments.push(segments);
            self.section_coords.push(coords);

            for pass in RenderPass::all() {
                let listed = std::mem::take(&mut pass_sections[pass.index()]);
                if listed.is_empty() {
                    continue;
                }

                let lists = &mut self.passes[pass.index()];
                lists.region_indices.push(region_index);
                lists.section_indices.push(listed);
                lists
                    .model_part_counts
                    .push(std::mem::take(&mut pass_counts[pass.index()]));
                lists
                    .model_part_segments
                    .push(std::mem::take(&mut pass_parts[pass.index()]));
            }
        }
    }
}

/// Facings of a box's quads that can be seen from `camera`.
pub fn visible_faces(camera: Point3<f32>, bounds: &ChunkRenderBounds) -> u32 {
    let mut faces = ChunkMeshFace::UNASSIGNED_BITS;

    if camera.y > bounds.y1 {
        faces |= ChunkMeshFace::UP.bit();
    }
    if camera.y < bounds.y2 {
        faces |= ChunkMeshFace::DOWN.bit();
    }
    if camera.x > bounds.x1 {
        faces |= ChunkMeshFace::EAST.bit();
    }
    if camera.x < bounds.x2 {
        faces |= ChunkMeshFace::WEST.bit();
    }
    if camera.z > bounds.z1 {
        faces |= ChunkMeshFace::SOUTH.bit();
    }
    if camera.z < bounds.z2 {
        faces |= ChunkMeshFace::NORTH.bit();
    }

    faces
}
