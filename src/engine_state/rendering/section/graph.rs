//! Per-frame state of the visibility search.
//!
//! Instead of clearing every section at the start of a frame, each section remembers
//! the last frame it was reached on. A section whose stamp differs from the current
//! frame counts as unvisited.

use crate::engine_state::rendering::meshing::ChunkOcclusionData;
use crate::engine_state::voxels::block::block_side::BlockSide;

use super::SectionId;

#[derive(Clone, Debug)]
pub struct ChunkGraphInfo {
    last_visible_frame: i32,
    visibility_data: u64,
    culling_state: u8,
}

impl Default for ChunkGraphInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkGraphInfo {
    pub fn new() -> Self {
        Self {
            last_visible_frame: -1,
            visibility_data: ChunkOcclusionData::all_open().bits(),
            culling_state: 0,
        }
    }

    /// Sections without occlusion data are open on every face.
    pub fn set_occlusion_data(&mut self, occlusion: Option<&ChunkOcclusionData>) {
        self.visibility_data = occlusion
            .copied()
            .unwrap_or_else(ChunkOcclusionData::all_open)
            .bits();
    }

    pub fn is_visible_through(&self, from: BlockSide, to: BlockSide) -> bool {
        self.visibility_data & (1 << (((from as u32) << 3) + to as u32)) != 0
    }

    pub fn last_visible_frame(&self) -> i32 {
        self.last_visible_frame
    }

    pub fn set_last_visible_frame(&mut self, frame: i32) {
        self.last_visible_frame = frame;
    }

    /// Faces the search has already entered through on the way to this section.
    pub fn culling_state(&self) -> u8 {
        self.culling_state
    }

    /// Inherits `parent` and adds the face the search entered through.
    pub fn set_culling_state(&mut self, parent: u8, entered_from: BlockSide) {
        self.culling_state = parent | entered_from.bit();
    }

    /// The search never leaves through a face it entered through further up the path.
    pub fn can_cull(&self, side: BlockSide) -> bool {
        self.culling_state & side.bit() != 0
    }

    pub fn reset_culling_state(&mut self) {
        self.culling_state = 0;
    }
}

/// FIFO of sections to expand, with the face each one was entered through.
///
/// Entries are never popped; the search walks the queue by index while pushing to its
/// end, and the whole queue is cleared once per frame.
#[derive(Debug, Default)]
pub struct ChunkGraphIterationQueue {
    entries: Vec<(SectionId, Option<BlockSide>)>,
}

impl ChunkGraphIterationQueue {
    pub fn add(&mut self, section: SectionId, entered_from: Option<BlockSide>) {
        self.entries.push((section, entered_from));
    }

    pub fn get(&self, index: usize) -> (SectionId, Option<BlockSide>) {
        self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn culling_state_accumulates_entry_faces() {
        let mut parent = ChunkGraphInfo::new();
        parent.set_culling_state(0, BlockSide::WEST);

        let mut child = ChunkGraphInfo::new();
        child.set_culling_state(parent.culling_state(), BlockSide::BOTTOM);

        assert!(child.can_cull(BlockSide::WEST));
        assert!(child.can_cull(BlockSide::BOTTOM));
        assert!(!child.can_cull(BlockSide::EAST));

        child.reset_culling_state();
        assert!(!child.can_cull(BlockSide::WEST));
    }

    #[test]
    fn missing_occlusion_is_open() {
        let mut info = ChunkGraphInfo::new();
        info.set_occlusion_data(Some(&ChunkOcclusionData::all_closed()));
        assert!(!info.is_visible_through(BlockSide::NORTH, BlockSide::SOUTH));

        info.set_occlusion_data(None);
        assert!(info.is_visible_through(BlockSide::NORTH, BlockSide::SOUTH));
        assert_eq!(info.last_visible_frame(), -1);
    }
}
