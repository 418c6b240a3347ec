/// VulkanBuffer - Vulkan implementation of the Buffer trait
///
/// Frame-pool slots and vertex data both live in host-visible memory that
/// stays mapped from creation to drop.

use ringflight_engine::ringflight::render::{check_buffer_range, Buffer, BufferUsage};
use ringflight_engine::ringflight::{Error, Result};
use ringflight_engine::engine_error;
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
}

impl VulkanBuffer {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        buffer: vk::Buffer,
        allocation: Allocation,
        size: u64,
        usage: BufferUsage,
    ) -> Self {
        Self {
            ctx,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        }
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Native handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn mapped(&self) -> Result<*mut u8> {
        self.mapped_ptr().ok_or_else(|| {
            engine_error!("ringflight::vulkan::Buffer", "buffer of {} bytes is not CPU-accessible", self.size);
            Error::InvalidResource("buffer is not CPU-accessible".to_string())
        })
    }
}

impl Buffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_buffer_range(self.size, offset, data.len())?;
        let mapped = self.mapped()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        check_buffer_range(self.size, offset, out.len())?;
        let mapped = self.mapped()?;
        unsafe {
            std::ptr::copy_nonoverlapping(mapped.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .map(|ptr| ptr.as_ptr() as *mut u8)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.ctx.allocator().free(allocation).ok();
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
