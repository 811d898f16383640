//! # Buffer State Module
//!
//! This module owns everything that touches GPU memory in the terrain core: the
//! device abstraction the rest of the crate talks to, the sub-allocating
//! [`BufferArena`] that region geometry lives in, and the [`BufferPool`] that
//! recycles buffers released by deleted or resized arenas.
//!
//! ## Key Features
//!
//! * A small `GpuDevice` interface (create, write, copy, delete, flush)
//! * Per-buffer usage analytics and memory tracking shared by every device
//! * A CPU-backed [`HeadlessDevice`] for tests and the demo binary
//! * A wgpu-backed [`WgpuDevice`] on native targets
//!
//! ## Architecture
//!
//! Devices are shared as `StResource<dyn GpuDevice>` ([`DeviceHandle`]). Every arena
//! and the buffer pool hold a clone of the same handle; only the render thread ever
//! locks it. Buffers are referred to by opaque [`BufferHandle`] values so arenas can be
//! moved between buffers without borrowing from the device.
//!
//! ## Performance Considerations
//!
//! * Copies are batched: a device may defer them until [`GpuDevice::flush`]
//! * Released buffers are pooled instead of destroyed, see [`BufferPool`]

pub mod arena;
pub mod buffer_pool;
pub mod headless;

cfg_if::cfg_if! {
    if #[cfg(not(target_family = "wasm"))] {
        pub mod wgpu_device;
        pub use wgpu_device::WgpuDevice;
    }
}

use std::{collections::HashMap, rc::Rc, sync::RwLock};

use crate::core::StResource;

pub use arena::{BufferArena, BufferSegment, PendingUpload, SegmentId, UploadOutcome};
pub use buffer_pool::BufferPool;
pub use headless::HeadlessDevice;

/// Opaque name of a buffer created by a [`GpuDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Shared, main-thread handle to whichever device backs the terrain.
pub type DeviceHandle = StResource<dyn GpuDevice>;

/// Hands out a [`DeviceHandle`] to a concrete device while the caller keeps its typed
/// handle (e.g. to read back a [`HeadlessDevice`] in tests).
pub fn share_device<D: GpuDevice + 'static>(device: &StResource<D>) -> DeviceHandle {
    device.share_as(|device| device as Rc<RwLock<dyn GpuDevice>>)
}

/// The operations the terrain core needs from a graphics device.
///
/// All offsets and sizes are in bytes. Implementations are free to defer writes and
/// copies until [`GpuDevice::flush`], but must preserve their submission order.
pub trait GpuDevice {
    /// Creates a buffer of `size` bytes usable as a vertex buffer and as a copy
    /// source and destination.
    fn create_buffer(&mut self, label: &str, size: u64) -> BufferHandle;

    /// Writes `data` into `buffer` starting at `offset`.
    ///
    /// # Panics
    /// Panics if the write would exceed the buffer bounds.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Copies `size` bytes from `src` to `dst`.
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    );

    /// Releases `buffer`. The handle must not be used afterwards.
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Submits any deferred copies.
    fn flush(&mut self) {}

    /// Reads back the contents of a buffer, if the device keeps them on the CPU.
    fn read_buffer(&self, _buffer: BufferHandle, _offset: u64, _size: u64) -> Option<Vec<u8>> {
        None
    }

    /// Usage analytics for every live buffer.
    fn analytics(&self) -> &DeviceAnalytics;

    /// Total bytes allocated across all live buffers.
    fn allocated_memory(&self) -> u64 {
        self.analytics().total_allocated_memory()
    }

    /// Number of live buffers.
    fn buffer_count(&self) -> usize {
        self.analytics().buffer_count()
    }
}

/// Analytics data for a GPU buffer
///
/// Tracks memory allocation, usage, and write operations for a buffer
/// to help identify optimization opportunities.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferAnalytics {
    /// Total memory allocated for the buffer in bytes
    pub allocated_memory: u64,
    /// Bytes written into the buffer, either directly or as a copy destination
    pub used_memory: u64,
    /// Number of times the buffer has been written to
    pub times_written: u64,
}

/// Registry of [`BufferAnalytics`] keyed by buffer, shared by the device backends.
#[derive(Debug, Default)]
pub struct DeviceAnalytics {
    buffers: HashMap<BufferHandle, BufferAnalytics>,
    next_handle: u32,
    copies: u64,
}

impl DeviceAnalytics {
    /// Registers a new buffer and returns its handle.
    pub fn register(&mut self, size: u64) -> BufferHandle {
        let handle = BufferHandle(self.next_handle);
        self.next_handle += 1;

        self.buffers.insert(
            handle,
            BufferAnalytics {
                allocated_memory: size,
                ..Default::default()
            },
        );

        handle
    }

    /// Records a write of `size` bytes.
    ///
    /// # Panics
    /// Panics if `buffer` is unknown or the range `[offset, offset + size)` is out of
    /// bounds.
    pub fn record_write(&mut self, buffer: BufferHandle, offset: u64, size: u64) {
        let analytics = self
            .buffers
            .get_mut(&buffer)
            .unwrap_or_else(|| panic!("Buffer {:?} does not exist", buffer));

        assert!(
            offset + size <= analytics.allocated_memory,
            "Write of {} bytes at {} exceeds buffer {:?} of {} bytes",
            size,
            offset,
            buffer,
            analytics.allocated_memory
        );

        analytics.used_memory = analytics.used_memory.max(offset + size);
        analytics.times_written += 1;
    }

    /// Records a buffer-to-buffer copy, validating both ranges.
    pub fn record_copy(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        let source = self
            .buffers
            .get(&src)
            .unwrap_or_else(|| panic!("Buffer {:?} does not exist", src));
        assert!(
            src_offset + size <= source.allocated_memory,
            "Copy source range exceeds buffer {:?}",
            src
        );

        self.record_write(dst, dst_offset, size);
        self.copies += 1;
    }

    /// Forgets a deleted buffer.
    ///
    /// # Panics
    /// Panics if the buffer was already deleted.
    pub fn unregister(&mut self, buffer: BufferHandle) -> BufferAnalytics {
        self.buffers
            .remove(&buffer)
            .unwrap_or_else(|| panic!("Buffer {:?} was already deleted", buffer))
    }

    pub fn get(&self, buffer: BufferHandle) -> Option<&BufferAnalytics> {
        self.buffers.get(&buffer)
    }

    pub fn total_allocated_memory(&self) -> u64 {
        self.buffers.values().map(|a| a.allocated_memory).sum()
    }

    pub fn total_used_memory(&self) -> u64 {
        self.buffers.values().map(|a| a.used_memory).sum()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of buffer-to-buffer copies issued so far.
    pub fn copy_count(&self) -> u64 {
        self.copies
    }
}
