use std::collections::HashMap;

use super::{BufferHandle, DeviceAnalytics, GpuDevice};

/// A [`GpuDevice`] that keeps every buffer as a byte vector in system memory.
///
/// Copies are applied immediately, so buffer contents can be read back with
/// [`GpuDevice::read_buffer`] at any time. Used by the tests and the demo binary.
#[derive(Default)]
pub struct HeadlessDevice {
    buffers: HashMap<BufferHandle, Vec<u8>>,
    analytics: DeviceAnalytics,
    flushes: u64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`GpuDevice::flush`] was called.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn buffer(&self, handle: BufferHandle) -> &Vec<u8> {
        self.buffers
            .get(&handle)
            .unwrap_or_else(|| panic!("Buffer {:?} does not exist", handle))
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, label: &str, size: u64) -> BufferHandle {
        let handle = self.analytics.register(size);
        log::trace!("Created headless buffer {:?} ({}, {} bytes)", handle, label, size);

        self.buffers.insert(handle, vec![0; size as usize]);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.analytics.record_write(buffer, offset, data.len() as u64);

        let start = offset as usize;
        if let Some(bytes) = self.buffers.get_mut(&buffer) {
            bytes[start..start + data.len()].copy_from_slice(data);
        }
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        self.analytics
            .record_copy(src, src_offset, dst, dst_offset, size);

        let (src_start, dst_start, len) = (src_offset as usize, dst_offset as usize, size as usize);
        let chunk = self.buffer(src)[src_start..src_start + len].to_vec();

        if let Some(bytes) = self.buffers.get_mut(&dst) {
            bytes[dst_start..dst_start + len].copy_from_slice(&chunk);
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.analytics.unregister(buffer);
        self.buffers.remove(&buffer);
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Option<Vec<u8>> {
        let bytes = self.buffers.get(&buffer)?;
        let start = offset as usize;
        bytes.get(start..start + size as usize).map(|s| s.to_vec())
    }

    fn analytics(&self) -> &DeviceAnalytics {
        &self.analytics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_are_visible_immediately() {
        let mut device = HeadlessDevice::new();
        let a = device.create_buffer("a", 8);
        let b = device.create_buffer("b", 8);

        device.write_buffer(a, 0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        device.copy_buffer(a, 2, b, 4, 4);

        assert_eq!(device.read_buffer(b, 0, 8), Some(vec![0, 0, 0, 0, 3, 4, 5, 6]));
        assert_eq!(device.analytics().copy_count(), 1);
    }

    #[test]
    fn delete_releases_memory() {
        let mut device = HeadlessDevice::new();
        let a = device.create_buffer("a", 32);
        assert_eq!(device.allocated_memory(), 32);

        device.delete_buffer(a);
        assert_eq!(device.allocated_memory(), 0);
        assert_eq!(device.read_buffer(a, 0, 4), None);
    }
}
