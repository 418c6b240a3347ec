//! Scene module
//!
//! Renderables, their transforms and the display-tick frame loop.

mod transform;
mod vertex;
mod renderable;
mod frame_loop;

pub use transform::Transform;
pub use vertex::{ColoredVertex, TexturedVertex, triangle};
pub use renderable::{Renderable, DrawContext, FrameUniforms, DEFAULT_CLEAR_COLOR};
pub use frame_loop::{FrameLoop, FrameTicker, FrameReport, SceneConfig};
