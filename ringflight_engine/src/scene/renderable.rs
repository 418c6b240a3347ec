/// Renderable - a mesh with a transform that submits one draw per frame.
///
/// Each renderable owns its own `FrameResourcePool`; the pool is never shared.
/// `submit_frame` is where the CPU gets throttled: it blocks in
/// `acquire_and_fill` when the GPU is `depth` frames behind.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::{DrawFailure, Error, Result};
use crate::frame_resource::{FramePoolConfig, FrameResourcePool};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, ClearColor, CommandQueue, CullMode, GraphicsDevice,
    LoadAction, Pipeline, PrimitiveType, RenderEncoder, RenderPassDesc, SamplerDesc,
    StoreAction, Surface, Texture,
};
use crate::scene::Transform;
use crate::{engine_debug, engine_error};

const SOURCE: &str = "ringflight::Renderable";

/// Clear color used when the draw context does not provide one (dark green)
pub const DEFAULT_CLEAR_COLOR: ClearColor = ClearColor::new(0.0, 104.0 / 255.0, 5.0 / 255.0, 1.0);

/// Per-draw uniform block, column-major matrices
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub fn new(model_view: &Mat4, projection: &Mat4) -> Self {
        Self {
            model_view: model_view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }
}

/// Backend objects needed to draw one frame
pub struct DrawContext<'a> {
    pub queue: &'a dyn CommandQueue,
    pub surface: &'a dyn Surface,
    pub pipeline: &'a Arc<dyn Pipeline>,
    /// None selects `DEFAULT_CLEAR_COLOR`
    pub clear_color: Option<ClearColor>,
}

/// Mesh + transform + per-frame uniform ring
pub struct Renderable {
    name: String,
    vertex_buffer: Arc<dyn Buffer>,
    vertex_count: u32,
    texture: Option<Arc<dyn Texture>>,
    sampler: SamplerDesc,
    transform: Transform,
    time: f64,
    pool: FrameResourcePool,
}

impl Renderable {
    /// Upload `vertices` and create the uniform ring
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if `vertices` is empty
    /// - any error from the device while creating the vertex buffer
    /// - `Error::AllocationFailed` if the uniform ring cannot be allocated
    pub fn new<V: Pod>(
        device: &dyn GraphicsDevice,
        name: impl Into<String>,
        vertices: &[V],
        texture: Option<Arc<dyn Texture>>,
        pool_config: FramePoolConfig,
    ) -> Result<Self> {
        let name = name.into();
        if vertices.is_empty() {
            return Err(Error::InvalidConfig(format!("renderable '{}' has no vertices", name)));
        }
        let vertex_count = u32::try_from(vertices.len()).map_err(|_| {
            Error::InvalidConfig(format!("renderable '{}' has too many vertices", name))
        })?;

        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let vertex_buffer = device.create_buffer(BufferDesc {
            size: bytes.len() as u64,
            usage: BufferUsage::Vertex,
        })?;
        vertex_buffer.update(0, bytes)?;

        let pool = FrameResourcePool::with_config(
            device,
            std::mem::size_of::<FrameUniforms>(),
            pool_config,
        )?;

        engine_debug!(
            SOURCE,
            "'{}' created: {} vertices, {} in-flight frames in '{}'",
            name,
            vertex_count,
            pool.depth(),
            pool.label()
        );

        Ok(Self {
            name,
            vertex_buffer,
            vertex_count,
            texture,
            sampler: SamplerDesc::default(),
            transform: Transform::default(),
            time: 0.0,
            pool,
        })
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn vertex_buffer(&self) -> &Arc<dyn Buffer> {
        &self.vertex_buffer
    }

    pub fn texture(&self) -> Option<&Arc<dyn Texture>> {
        self.texture.as_ref()
    }

    pub fn sampler(&self) -> &SamplerDesc {
        &self.sampler
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Accumulated time in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pool(&self) -> &FrameResourcePool {
        &self.pool
    }

    /// Local model matrix (see `Transform::to_matrix`)
    pub fn model_matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    // ===== FRAME =====

    /// Advance the object's clock
    pub fn update_with_delta(&mut self, delta: f64) {
        self.time += delta;
    }

    /// Record and commit one draw of this object
    ///
    /// Blocks while all uniform slots are in flight. Never waits for the GPU
    /// otherwise. On every error path the acquired slot is given back.
    ///
    /// # Errors
    ///
    /// - `Error::DrawFailure` if no drawable, command buffer or render
    ///   encoder is available (the frame is skipped)
    /// - encoder or commit errors from the backend
    pub fn submit_frame(&mut self, ctx: &DrawContext<'_>, parent: &Mat4, projection: &Mat4) -> Result<()> {
        let model_view = *parent * self.model_matrix();
        let uniforms = FrameUniforms::new(&model_view, projection);

        let handle = self.pool.acquire_and_fill(bytemuck::bytes_of(&uniforms));
        let slot = Arc::clone(self.pool.slot(&handle));
        // From here on, dropping the handler (any early return) frees the slot
        let on_complete = self.pool.release_on_completion(handle);

        let drawable = ctx.surface.next_drawable().ok_or(DrawFailure::NoDrawable)?;
        let mut cmd = ctx.queue.command_buffer().ok_or(DrawFailure::NoCommandBuffer)?;

        let pass = RenderPassDesc {
            drawable: Arc::clone(&drawable),
            load_action: LoadAction::Clear(ctx.clear_color.unwrap_or(DEFAULT_CLEAR_COLOR)),
            store_action: StoreAction::Store,
        };
        let mut encoder = cmd.render_encoder(&pass).ok_or(DrawFailure::NoRenderEncoder)?;

        self.encode(encoder.as_mut(), ctx.pipeline, &slot)?;
        encoder.end_encoding()?;

        cmd.add_completed_handler(on_complete);
        cmd.present(&drawable);
        cmd.commit().map_err(|e| {
            engine_error!(SOURCE, "'{}': commit failed: {}", self.name, e);
            e
        })
    }

    fn encode(
        &self,
        encoder: &mut dyn RenderEncoder,
        pipeline: &Arc<dyn Pipeline>,
        uniforms: &Arc<dyn Buffer>,
    ) -> Result<()> {
        encoder.set_pipeline(pipeline)?;
        encoder.set_vertex_buffer(&self.vertex_buffer, 0, 0)?;
        encoder.set_cull_mode(CullMode::Front)?;
        encoder.set_fragment_texture(self.texture.as_ref(), 0)?;
        encoder.set_fragment_sampler(&self.sampler, 0)?;
        encoder.set_uniform_buffer(uniforms, 0, 1)?;
        encoder.draw(PrimitiveType::Triangle, 0, self.vertex_count, self.vertex_count / 3)
    }

    /// Block until the GPU released every slot of this object
    pub fn drain(&self) {
        self.pool.drain();
    }
}

#[cfg(test)]
#[path = "renderable_tests.rs"]
mod tests;
