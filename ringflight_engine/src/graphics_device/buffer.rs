/// Buffer trait and buffer descriptor

use std::any::Any;

use crate::error::Result;

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Immutable vertex data
    Vertex,
    /// Per-draw uniform data (CPU-writable, GPU-readable, persistently mapped)
    Uniform,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// The buffer is destroyed when the last reference is dropped.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Write `data` at `offset`
    ///
    /// # Errors
    ///
    /// `Error::InvalidResource` if the range exceeds the buffer or the buffer
    /// is not CPU-accessible.
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Read `out.len()` bytes starting at `offset`
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Raw pointer to persistently mapped memory
    ///
    /// Returns None if the buffer is not CPU-accessible (device-local only).
    /// The pointer remains valid for the lifetime of the buffer.
    fn mapped_ptr(&self) -> Option<*mut u8>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

/// Check that `[offset, offset + len)` lies within a buffer of `size` bytes
pub fn check_buffer_range(size: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(crate::error::Error::InvalidResource(format!(
            "range {}..{} exceeds buffer of {} bytes",
            offset,
            offset.saturating_add(len as u64),
            size
        ))),
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
