//! Draw submission seam between the terrain core and a graphics backend.
//!
//! The core never records GPU commands itself. For every region that has something to
//! draw in a pass it hands a [`RegionDrawBatch`] to a [`MeshBackend`], which is free to
//! turn the commands into indirect draws, direct draws, or nothing at all.

use std::collections::HashMap;

use cgmath::{Point3, Vector3};

use super::region::RegionKey;
use super::RenderPass;
use crate::engine_state::buffer_state::BufferHandle;

/// One draw, laid out like an indirect draw argument buffer entry.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    /// Index of the section within its region's batch
    pub first_instance: u32,
}

/// Everything needed to draw one region in one pass.
#[derive(Debug)]
pub struct RegionDrawBatch<'a> {
    pub region: RegionKey,
    /// The region's vertex buffer
    pub buffer: BufferHandle,
    /// Camera position relative to the region origin, in blocks
    pub camera_offset: Vector3<f32>,
    /// Section coordinates of each instance referenced by `first_instance`
    pub sections: &'a [Point3<i32>],
    pub commands: &'a [DrawCommand],
}

/// The capabilities the core needs from whatever draws terrain.
pub trait MeshBackend {
    /// The vertex buffer of `region` is new or has been replaced.
    fn upload(&mut self, region: RegionKey, buffer: BufferHandle);

    /// Draws one region's share of `pass`.
    fn render(&mut self, pass: RenderPass, batch: &RegionDrawBatch<'_>);

    /// `region` no longer exists; release anything kept for it.
    fn delete(&mut self, region: RegionKey);
}

/// A backend that only records what it was asked to draw.
///
/// Used by the headless demo and by tests; its commands can be copied verbatim into an
/// indirect buffer with [`DrawCommandRecorder::indirect_bytes`].
#[derive(Debug, Default)]
pub struct DrawCommandRecorder {
    buffers: HashMap<RegionKey, BufferHandle>,
    draws: Vec<(RenderPass, RegionKey, Vec<DrawCommand>)>,
    uploads: usize,
    deletes: usize,
}

impl DrawCommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets recorded draws, keeping the known region buffers.
    pub fn clear(&mut self) {
        self.draws.clear();
    }

    pub fn draws(&self) -> &[(RenderPass, RegionKey, Vec<DrawCommand>)] {
        &self.draws
    }

    pub fn commands(&self, pass: RenderPass) -> impl Iterator<Item = &DrawCommand> {
        self.draws
            .iter()
            .filter(move |(p, _, _)| *p == pass)
            .flat_map(|(_, _, commands)| commands)
    }

    pub fn vertex_count(&self, pass: RenderPass) -> u64 {
        self.commands(pass).map(|c| c.vertex_count as u64).sum()
    }

    /// Buffer last uploaded for `region`.
    pub fn buffer(&self, region: RegionKey) -> Option<BufferHandle> {
        self.buffers.get(&region).copied()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn delete_count(&self) -> usize {
        self.deletes
    }

    pub fn indirect_bytes(&self, pass: RenderPass) -> Vec<u8> {
        let commands: Vec<DrawCommand> = self.commands(pass).copied().collect();
        bytemuck::cast_slice(&commands).to_vec()
    }
}

impl MeshBackend for DrawCommandRecorder {
    fn upload(&mut self, region: RegionKey, buffer: BufferHandle) {
        self.buffers.insert(region, buffer);
        self.uploads += 1;
    }

    fn render(&mut self, pass: RenderPass, batch: &RegionDrawBatch<'_>) {
        assert_eq!(
            self.buffers.get(&batch.region),
            Some(&batch.buffer),
            "Region {:?} drawn before its buffer was uploaded",
            batch.region
        );

        self.draws.push((pass, batch.region, batch.commands.to_vec()));
    }

    fn delete(&mut self, region: RegionKey) {
        self.buffers.remove(&region);
        self.deletes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_tracks_buffers_and_commands() {
        let mut recorder = DrawCommandRecorder::new();
        let region = Point3::new(0, 0, 0);
        let command = DrawCommand {
            vertex_count: 24,
            instance_count: 1,
            first_vertex: 100,
            first_instance: 0,
        };

        recorder.upload(region, BufferHandle(3));
        recorder.render(
            RenderPass::SOLID,
            &RegionDrawBatch {
                region,
                buffer: BufferHandle(3),
                camera_offset: Vector3::new(0.0, 0.0, 0.0),
                sections: &[Point3::new(0, 0, 0)],
                commands: &[command],
            },
        );

        assert_eq!(recorder.vertex_count(RenderPass::SOLID), 24);
        assert_eq!(recorder.vertex_count(RenderPass::CUTOUT), 0);
        assert_eq!(recorder.indirect_bytes(RenderPass::SOLID).len(), 16);

        recorder.delete(region);
        assert_eq!(recorder.buffer(region), None);
        assert_eq!((recorder.upload_count(), recorder.delete_count()), (1, 1));
    }

    #[test]
    #[should_panic(expected = "before its buffer was uploaded")]
    fn drawing_an_unknown_region_panics() {
        let mut recorder = DrawCommandRecorder::new();
        recorder.render(
            RenderPass::SOLID,
            &RegionDrawBatch {
                region: Point3::new(0, 0, 0),
                buffer: BufferHandle(1),
                camera_offset: Vector3::new(0.0, 0.0, 0.0),
                sections: &[],
                commands: &[],
            },
        );
    }
}
