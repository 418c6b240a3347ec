/// GraphicsDevice trait - factory for GPU memory used by the frame loop

use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{Buffer, BufferDesc};

/// Backend creation configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "RingFlight Application".to_string(),
            app_version: (1, 0, 0),
        }
    }
}

/// Main device trait
///
/// Implemented by backend-specific devices (e.g., VulkanGraphicsDevice).
/// Command queues and surfaces are backend objects obtained from the concrete
/// device type; the core only needs buffer allocation from this trait.
pub trait GraphicsDevice: Send + Sync {
    /// Create a buffer
    ///
    /// `BufferUsage::Uniform` buffers must be CPU-writable, GPU-readable and
    /// persistently mapped for their whole lifetime.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` or `Error::BackendError` when the backend cannot
    /// provide the memory.
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Wait for all GPU operations to complete
    fn wait_idle(&self) -> Result<()>;
}
