/*!
# RingFlight Engine

Core traits and types for the RingFlight rendering loop.

This crate provides the platform-agnostic side of a small real-time renderer:
backend traits (implemented by plugin crates such as the Vulkan backend), the
per-object frame-resource ring buffer that bounds how many frames the CPU may
run ahead of the GPU, and the renderable/frame-loop glue driving it.

## Architecture

- **GraphicsDevice**: Factory trait for GPU buffers
- **CommandQueue / CommandBuffer / RenderEncoder**: Frame recording and submission
- **Surface / Drawable**: Presentable render targets
- **FrameResourcePool**: Ring of uniform slots gated by a counting semaphore
- **Renderable**: Mesh + transform that submits one draw per frame
- **FrameLoop**: Display-tick driver that swallows per-frame failures

Backend implementations provide concrete types that implement these traits.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod frame_resource;
pub mod scene;

// Main ringflight namespace module
pub mod ringflight {
    // Error types
    pub use crate::error::{Error, Result, DrawFailure};

    // Engine facade (logging)
    pub use crate::engine::Engine;

    // Device factory trait
    pub use crate::graphics_device::GraphicsDevice;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Backend sub-module with all device-facing types
    pub mod render {
        pub use crate::graphics_device::*;
    }

    // Frame resource sub-module
    pub mod frame {
        pub use crate::frame_resource::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }
}

// Re-export math and byte-casting libraries at crate root
pub use glam;
pub use bytemuck;
