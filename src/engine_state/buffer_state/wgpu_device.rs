//! wgpu implementation of [`GpuDevice`].
//!
//! Writes go through `Queue::write_buffer`. Copies are recorded into a single command
//! encoder and submitted on [`GpuDevice::flush`]; buffers deleted while copies are still
//! pending are kept alive until that submission so the copies never read a destroyed
//! buffer.

use std::collections::HashMap;

use anyhow::Context;
use wgpu::{Buffer, BufferUsages, CommandEncoder, Device, Queue};

use super::{BufferHandle, DeviceAnalytics, GpuDevice};

pub struct WgpuDevice {
    device: Device,
    queue: Queue,
    buffers: HashMap<BufferHandle, Buffer>,
    encoder: Option<CommandEncoder>,
    pending_deletes: Vec<Buffer>,
    analytics: DeviceAnalytics,
}

impl WgpuDevice {
    /// Wraps an existing device and queue.
    pub fn new(device: Device, queue: Queue) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            encoder: None,
            pending_deletes: Vec::new(),
            analytics: DeviceAnalytics::default(),
        }
    }

    /// Requests an adapter without a surface and opens a device on it.
    ///
    /// # Errors
    /// Fails if no adapter is available or the device request is rejected.
    pub fn request_headless() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::empty(),
            backend_options: wgpu::BackendOptions::from_env_or_default(),
        });

        pollster::block_on(async move {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .context("no graphics adapter available")?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    label: Some("terrain device"),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                    trace: wgpu::Trace::Off,
                })
                .await
                .context("failed to open graphics device")?;

            log::info!("Using adapter {:?}", adapter.get_info().name);

            Ok(Self::new(device, queue))
        })
    }

    /// The underlying wgpu buffer, for binding as a vertex buffer.
    pub fn get_buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.buffers.get(&handle)
    }

    fn encoder(&mut self) -> &mut CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("terrain copy encoder"),
            })
        })
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&mut self, label: &str, size: u64) -> BufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let handle = self.analytics.register(size);
        self.buffers.insert(handle, buffer);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        self.analytics.record_write(buffer, offset, data.len() as u64);

        if let Some(target) = self.buffers.get(&buffer) {
            self.queue.write_buffer(target, offset, data);
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

        let (Some(source), Some(target)) = (
            self.buffers.get(&src).cloned(),
            self.buffers.get(&dst).cloned(),
        ) else {
            return;
        };

        self.encoder()
            .copy_buffer_to_buffer(&source, src_offset, &target, dst_offset, size);
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.analytics.unregister(buffer);

        if let Some(buffer) = self.buffers.remove(&buffer) {
            if self.encoder.is_some() {
                self.pending_deletes.push(buffer);
            } else {
                buffer.destroy();
            }
        }
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        for buffer in self.pending_deletes.drain(..) {
            buffer.destroy();
        }
    }

    fn analytics(&self) -> &DeviceAnalytics {
        &self.analytics
    }
}
