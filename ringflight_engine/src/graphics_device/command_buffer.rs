/// Command submission traits - queue, command buffer and render encoder
///
/// The model follows a single in-order hardware queue: command buffers are
/// executed in commit order and each one signals completion once.

use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{Buffer, Drawable, Pipeline, SamplerDesc, Texture};

/// Continuation run by the backend once a committed command buffer finished
/// executing on the GPU.
///
/// Handlers may run on any thread. A backend that never submits the work
/// (command buffer dropped before commit, failed commit) drops its handlers
/// without calling them.
pub type CompletionHandler = Box<dyn FnOnce() + Send + 'static>;

/// RGBA clear color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl ClearColor {
    pub const fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self { red, green, blue, alpha }
    }

    /// As `[r, g, b, a]` in single precision
    pub fn to_array(self) -> [f32; 4] {
        [self.red as f32, self.green as f32, self.blue as f32, self.alpha as f32]
    }
}

/// What happens to the color attachment when the encoder opens
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction {
    /// Keep previous contents
    Load,
    /// Clear to the given color
    Clear(ClearColor),
    /// Contents are undefined
    DontCare,
}

/// What happens to the color attachment when the encoder closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Store,
    DontCare,
}

/// Description of a single-color-attachment render pass
#[derive(Clone)]
pub struct RenderPassDesc {
    /// Render target
    pub drawable: Arc<dyn Drawable>,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
}

/// Which triangle faces are culled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Primitive assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Point,
    Line,
    LineStrip,
    Triangle,
    TriangleStrip,
}

/// Queue that hands out command buffers
pub trait CommandQueue: Send + Sync {
    /// Create a command buffer ready for recording
    ///
    /// Returns None if the backend cannot provide one right now.
    fn command_buffer(&self) -> Option<Box<dyn CommandBuffer>>;
}

/// Single-use command buffer
pub trait CommandBuffer: Send {
    /// Open a render encoder for one render pass
    ///
    /// Returns None if the encoder cannot be created (e.g., the drawable is
    /// not usable by this backend).
    fn render_encoder(&mut self, desc: &RenderPassDesc) -> Option<Box<dyn RenderEncoder>>;

    /// Register a continuation to run once the GPU finished this buffer
    fn add_completed_handler(&mut self, handler: CompletionHandler);

    /// Schedule presentation of `drawable` after this buffer's work
    fn present(&mut self, drawable: &Arc<dyn Drawable>);

    /// Submit to the queue
    ///
    /// # Errors
    ///
    /// `Error::BackendError` if submission failed. In that case the
    /// completion handlers have been dropped without running.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Records draw commands for one render pass
pub trait RenderEncoder: Send {
    /// Bind a graphics pipeline
    fn set_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Bind vertex input data at `index`
    fn set_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index: u32) -> Result<()>;

    /// Bind per-draw uniform data at `index`
    fn set_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index: u32) -> Result<()>;

    /// Select face culling
    fn set_cull_mode(&mut self, mode: CullMode) -> Result<()>;

    /// Bind (or unbind with None) a fragment texture at `index`
    fn set_fragment_texture(&mut self, texture: Option<&Arc<dyn Texture>>, index: u32) -> Result<()>;

    /// Bind fragment sampler state at `index`
    fn set_fragment_sampler(&mut self, sampler: &SamplerDesc, index: u32) -> Result<()>;

    /// Draw non-indexed primitives
    fn draw(
        &mut self,
        primitive: PrimitiveType,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<()>;

    /// Close the render pass
    fn end_encoding(self: Box<Self>) -> Result<()>;
}
