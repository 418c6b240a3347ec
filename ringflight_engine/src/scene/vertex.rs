/// Vertex layouts understood by the default pipelines, plus a test mesh.

use bytemuck::{Pod, Zeroable};

/// Position + RGBA color, 28 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColoredVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl ColoredVertex {
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }
}

/// Position + RGBA color + texture coordinates, 36 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl TexturedVertex {
    pub const fn new(position: [f32; 3], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self { position, color, uv }
    }
}

/// Red/green/blue triangle in the XY plane, counter-clockwise
pub fn triangle() -> [ColoredVertex; 3] {
    [
        ColoredVertex::new([0.0, 1.0, 0.0], [1.0, 0.0, 0.0, 1.0]),
        ColoredVertex::new([-1.0, -1.0, 0.0], [0.0, 1.0, 0.0, 1.0]),
        ColoredVertex::new([1.0, -1.0, 0.0], [0.0, 0.0, 1.0, 1.0]),
    ]
}
