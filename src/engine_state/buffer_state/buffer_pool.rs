//! Recycling pool for device buffers.
//!
//! Regions are created and destroyed constantly as the camera moves, and arenas swap
//! their buffer every time they grow or compact. Instead of destroying the old buffer
//! the arena hands it back here, and the next arena that needs a buffer of a similar
//! size takes it out again.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::{BufferHandle, DeviceHandle};

/// Maximum number of released buffers kept in reserve.
pub const PRUNE_SAMPLE_SIZE: usize = 100;

pub struct BufferPool {
    device: DeviceHandle,
    reserve: LruCache<BufferHandle, u64>,
    reserved_bytes: u64,
    active_bytes: u64,
}

impl BufferPool {
    pub fn new(device: DeviceHandle) -> Self {
        Self {
            device,
            reserve: LruCache::new(
                NonZeroUsize::new(PRUNE_SAMPLE_SIZE).unwrap_or(NonZeroUsize::MIN),
            ),
            reserved_bytes: 0,
            active_bytes: 0,
        }
    }

    /// Hands out a buffer of at least `min_bytes`, preferring the smallest adequate
    /// buffer in the reserve and creating a new one otherwise.
    ///
    /// Returns the handle together with the buffer's real size.
    pub fn acquire(&mut self, label: &str, min_bytes: u64) -> (BufferHandle, u64) {
        let candidate = self
            .reserve
            .iter()
            .filter(|(_, size)| **size >= min_bytes)
            .min_by_key(|(_, size)| **size)
            .map(|(handle, _)| *handle);

        let (handle, size) = match candidate.and_then(|h| self.reserve.pop_entry(&h)) {
            Some((handle, size)) => {
                self.reserved_bytes -= size;
                log::trace!("Reusing pooled buffer {:?} ({} bytes)", handle, size);
                (handle, size)
            }
            None => (self.device.get_mut().create_buffer(label, min_bytes), min_bytes),
        };

        self.active_bytes += size;
        (handle, size)
    }

    /// Returns a buffer to the reserve. If the reserve is full the least recently
    /// released buffer is destroyed to make room.
    pub fn release(&mut self, handle: BufferHandle, size: u64) {
        self.active_bytes = self.active_bytes.saturating_sub(size);
        self.reserved_bytes += size;

        if let Some((evicted, evicted_size)) = self.reserve.push(handle, size) {
            self.reserved_bytes -= evicted_size;
            self.device.get_mut().delete_buffer(evicted);
        }
    }

    /// Destroys least recently released buffers until the reserve has shrunk by
    /// `-percent_modifier` (e.g. `-0.2` removes a fifth of the reserved bytes).
    pub fn prune(&mut self, percent_modifier: f32) {
        // rounded so that f32 modifiers like -0.2 do not truncate to one byte short
        let target = (self.reserved_bytes as f64 * (1.0 + percent_modifier as f64))
            .round()
            .max(0.0) as u64;
        let mut removed = 0;

        while self.reserved_bytes > target {
            let Some((handle, size)) = self.reserve.pop_lru() else {
                break;
            };

            self.reserved_bytes -= size;
            self.device.get_mut().delete_buffer(handle);
            removed += 1;
        }

        log::debug!(
            "Pruned {} pooled buffers, {} bytes still in reserve",
            removed,
            self.reserved_bytes
        );
    }

    /// Bytes held by buffers sitting in the reserve.
    pub fn reserved_memory(&self) -> u64 {
        self.reserved_bytes
    }

    /// Bytes held by buffers currently handed out.
    pub fn active_memory(&self) -> u64 {
        self.active_bytes
    }

    /// Number of buffers sitting in the reserve.
    pub fn reserved_buffers(&self) -> usize {
        self.reserve.len()
    }

    /// Destroys every pooled buffer.
    pub fn delete(&mut self) {
        while let Some((handle, _)) = self.reserve.pop_lru() {
            self.device.get_mut().delete_buffer(handle);
        }

        self.reserved_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StResource;
    use crate::engine_state::buffer_state::{share_device, GpuDevice, HeadlessDevice};

    fn device() -> (StResource<HeadlessDevice>, DeviceHandle) {
        let device = StResource::new(HeadlessDevice::new());
        let shared = share_device(&device);
        (device, shared)
    }

    #[test]
    fn acquire_reuses_smallest_adequate_buffer() {
        let (device, shared) = device();
        let mut pool = BufferPool::new(shared);

        let (a, _) = pool.acquire("a", 64);
        let (b, _) = pool.acquire("b", 256);
        pool.release(a, 64);
        pool.release(b, 256);

        let (reused, size) = pool.acquire("c", 100);
        assert_eq!(reused, b);
        assert_eq!(size, 256);
        assert_eq!(pool.reserved_memory(), 64);
        assert_eq!(device.get().buffer_count(), 2);
    }

    #[test]
    fn prune_removes_a_fifth_of_the_reserve() {
        let (device, shared) = device();
        let mut pool = BufferPool::new(shared);

        let handles: Vec<_> = (0..10).map(|_| pool.acquire("buf", 100).0).collect();
        for handle in handles {
            pool.release(handle, 100);
        }

        pool.prune(-0.2);

        assert_eq!(pool.reserved_buffers(), 8);
        assert_eq!(pool.reserved_memory(), 800);
        assert_eq!(device.get().buffer_count(), 8);
    }

    #[test]
    fn prune_target_is_not_truncated() {
        let (_device, shared) = device();
        let mut pool = BufferPool::new(shared);

        let handles: Vec<_> = (0..100).map(|_| pool.acquire("buf", 10).0).collect();
        for handle in handles {
            pool.release(handle, 10);
        }

        pool.prune(-0.2);
        assert_eq!(pool.reserved_memory(), 800);

        pool.prune(-0.35);
        assert_eq!(pool.reserved_memory(), 520);
    }

    #[test]
    fn reserve_is_bounded() {
        let (device, shared) = device();
        let mut pool = BufferPool::new(shared);

        let handles: Vec<_> = (0..PRUNE_SAMPLE_SIZE + 5)
            .map(|_| pool.acquire("buf", 16).0)
            .collect();
        for handle in handles {
            pool.release(handle, 16);
        }

        assert_eq!(pool.reserved_buffers(), PRUNE_SAMPLE_SIZE);
        assert_eq!(device.get().buffer_count(), PRUNE_SAMPLE_SIZE);
    }
}
