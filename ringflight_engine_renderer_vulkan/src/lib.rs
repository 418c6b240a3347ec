/*!
# RingFlight Engine - Vulkan Backend

Vulkan implementation of the ringflight_engine device traits, using Ash for
Vulkan bindings and gpu-allocator for memory management.

The backend is headless: frames render into an offscreen ring of images.
Uniform slots live in persistently mapped host-visible memory, and a
completion thread turns per-command-buffer fences into completion handlers,
which is what lets `FrameResourcePool` recycle slots.

## Pipelines

Shader compilation and pipeline creation stay with the application. A
pipeline passed to `VulkanPipeline::from_raw` must use
`VulkanGraphicsDevice::descriptor_set_layout` as set 0, declare
`REQUIRED_DYNAMIC_STATES` and be compatible with
`VulkanOffscreenSurface::render_pass`.
*/

mod vulkan;
mod vulkan_buffer;
mod vulkan_command_queue;
mod vulkan_context;
#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;
mod vulkan_offscreen_surface;
mod vulkan_pipeline;
mod vulkan_render_encoder;
mod vulkan_render_pass;
mod vulkan_sampler;
mod vulkan_texture;

pub use vulkan::{VulkanGraphicsDevice, TEXTURE_BINDING, UNIFORM_BINDING};
pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_command_queue::{VulkanCommandBuffer, VulkanCommandQueue};
pub use vulkan_offscreen_surface::{VulkanDrawable, VulkanOffscreenSurface, OFFSCREEN_FORMAT};
pub use vulkan_pipeline::{VulkanPipeline, REQUIRED_DYNAMIC_STATES};
pub use vulkan_texture::VulkanTexture;

// Re-export ash so applications build pipelines against the same version
pub use ash;
