/// Graphics device module - backend-facing traits and descriptors

// Module declarations
pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod pipeline;
pub mod command_buffer;
pub mod swapchain;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use buffer::*;
pub use texture::*;
pub use pipeline::*;
pub use command_buffer::*;
pub use swapchain::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
