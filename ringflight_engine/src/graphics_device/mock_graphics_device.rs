/// Mock graphics device for unit tests (no GPU required)
///
/// Buffers are plain host memory. Command buffers record their commands as
/// strings and the "GPU" only finishes work when a test calls
/// `MockCommandQueue::complete_next()` / `complete_all()`, which runs the
/// completion handlers in commit order like an in-order hardware queue.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::graphics_device::{
    check_buffer_range, Buffer, BufferDesc, BufferUsage, CommandBuffer, CommandQueue,
    CompletionHandler, CullMode, Drawable, GraphicsDevice, LoadAction, Pipeline, PrimitiveType,
    RenderEncoder, RenderPassDesc, SamplerDesc, Surface, Texture,
};

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub id: usize,
    pub size: u64,
    pub usage: BufferUsage,
    data: Mutex<Vec<u8>>,
    mapped: bool,
    live: Arc<AtomicUsize>,
}

impl MockBuffer {
    fn new(id: usize, desc: &BufferDesc, mapped: bool, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            size: desc.size,
            usage: desc.usage,
            data: Mutex::new(vec![0u8; desc.size as usize]),
            mapped,
            live,
        }
    }

    /// Copy of the whole buffer contents
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_buffer_range(self.size, offset, data.len())?;
        let mut bytes = self.data.lock().unwrap();
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        check_buffer_range(self.size, offset, out.len())?;
        let bytes = self.data.lock().unwrap();
        let start = offset as usize;
        out.copy_from_slice(&bytes[start..start + out.len()]);
        Ok(())
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        if self.mapped {
            Some(self.data.lock().unwrap().as_mut_ptr())
        } else {
            None
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Mock GraphicsDevice
// ============================================================================

pub struct MockGraphicsDevice {
    /// Buffers ever created
    pub created: AtomicUsize,
    /// Buffers currently alive
    pub live: Arc<AtomicUsize>,
    /// Fail the allocation with this creation index (0-based)
    pub fail_at: Mutex<Option<usize>>,
    /// Hand out uniform buffers that are not CPU-mapped
    pub unmapped_uniforms: AtomicBool,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            fail_at: Mutex::new(None),
            unmapped_uniforms: AtomicBool::new(false),
        }
    }

    /// Make the `index`-th buffer creation (0-based, counted from now on) fail
    pub fn fail_allocation_at(&self, index: usize) {
        let base = self.created.load(Ordering::SeqCst);
        *self.fail_at.lock().unwrap() = Some(base + index);
    }

    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn created_buffers(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        let index = self.created.load(Ordering::SeqCst);
        if *self.fail_at.lock().unwrap() == Some(index) {
            *self.fail_at.lock().unwrap() = None;
            return Err(Error::OutOfMemory);
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let mapped = match desc.usage {
            BufferUsage::Uniform => !self.unmapped_uniforms.load(Ordering::SeqCst),
            BufferUsage::Vertex => true,
        };
        Ok(Arc::new(MockBuffer::new(index, &desc, mapped, self.live.clone())))
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Mock Texture / Pipeline / Drawable / Surface
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    pub width: u32,
    pub height: u32,
    pub name: String,
}

impl MockTexture {
    pub fn new(width: u32, height: u32, name: String) -> Self {
        Self { width, height, name }
    }
}

impl Texture for MockTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockPipeline {
    pub name: String,
}

impl MockPipeline {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

impl Pipeline for MockPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct MockDrawable {
    pub id: usize,
}

impl Drawable for MockDrawable {
    fn width(&self) -> u32 {
        800
    }

    fn height(&self) -> u32 {
        600
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockSurface {
    next_id: AtomicUsize,
    /// When false, next_drawable() returns None
    pub available: AtomicBool,
}

impl MockSurface {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Surface for MockSurface {
    fn next_drawable(&self) -> Option<Arc<dyn Drawable>> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(MockDrawable { id }))
    }
}

// ============================================================================
// Mock CommandQueue
// ============================================================================

#[derive(Default)]
struct QueueState {
    /// Handlers of committed buffers not yet "finished" by the GPU, in commit order
    in_flight: VecDeque<Vec<CompletionHandler>>,
    /// Recorded commands of every committed buffer
    submissions: Vec<Vec<String>>,
    /// Load action of every render encoder opened, committed or not
    load_actions: Vec<LoadAction>,
}

pub struct MockCommandQueue {
    state: Arc<Mutex<QueueState>>,
    pub fail_command_buffer: AtomicBool,
    pub fail_encoder: AtomicBool,
    pub fail_commit: AtomicBool,
}

impl MockCommandQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            fail_command_buffer: AtomicBool::new(false),
            fail_encoder: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
        }
    }

    /// Finish the oldest committed buffer and run its handlers
    ///
    /// Returns false if nothing was in flight.
    pub fn complete_next(&self) -> bool {
        // Handlers run outside the lock; they may take other locks.
        let handlers = self.state.lock().unwrap().in_flight.pop_front();
        match handlers {
            Some(handlers) => {
                for handler in handlers {
                    handler();
                }
                true
            }
            None => false,
        }
    }

    /// Finish everything in flight
    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        while self.complete_next() {
            completed += 1;
        }
        completed
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    pub fn submissions(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn load_actions(&self) -> Vec<LoadAction> {
        self.state.lock().unwrap().load_actions.clone()
    }
}

impl CommandQueue for MockCommandQueue {
    fn command_buffer(&self) -> Option<Box<dyn CommandBuffer>> {
        if self.fail_command_buffer.load(Ordering::SeqCst) {
            return None;
        }
        Some(Box::new(MockCommandBuffer {
            queue: self.state.clone(),
            commands: Arc::new(Mutex::new(Vec::new())),
            handlers: Vec::new(),
            fail_encoder: self.fail_encoder.load(Ordering::SeqCst),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }
}

// ============================================================================
// Mock CommandBuffer
// ============================================================================

pub struct MockCommandBuffer {
    queue: Arc<Mutex<QueueState>>,
    commands: Arc<Mutex<Vec<String>>>,
    handlers: Vec<CompletionHandler>,
    fail_encoder: bool,
    fail_commit: bool,
}

impl CommandBuffer for MockCommandBuffer {
    fn render_encoder(&mut self, desc: &RenderPassDesc) -> Option<Box<dyn RenderEncoder>> {
        if self.fail_encoder {
            return None;
        }
        let drawable_id = desc
            .drawable
            .as_any()
            .downcast_ref::<MockDrawable>()
            .map(|d| d.id)?;
        self.queue.lock().unwrap().load_actions.push(desc.load_action);
        self.commands
            .lock()
            .unwrap()
            .push(format!("begin_render_pass drawable={}", drawable_id));
        Some(Box::new(MockRenderEncoder { commands: self.commands.clone() }))
    }

    fn add_completed_handler(&mut self, handler: CompletionHandler) {
        self.commands.lock().unwrap().push("add_completed_handler".to_string());
        self.handlers.push(handler);
    }

    fn present(&mut self, drawable: &Arc<dyn Drawable>) {
        let id = drawable
            .as_any()
            .downcast_ref::<MockDrawable>()
            .map(|d| d.id)
            .unwrap_or(usize::MAX);
        self.commands.lock().unwrap().push(format!("present drawable={}", id));
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            // Dropping self drops the handlers without running them
            return Err(Error::BackendError("mock commit failure".to_string()));
        }
        let this = *self;
        let commands = this.commands.lock().unwrap().clone();
        let mut queue = this.queue.lock().unwrap();
        queue.submissions.push(commands);
        queue.in_flight.push_back(this.handlers);
        Ok(())
    }
}

// ============================================================================
// Mock RenderEncoder
// ============================================================================

pub struct MockRenderEncoder {
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockRenderEncoder {
    fn push(&self, command: String) -> Result<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

fn buffer_id(buffer: &Arc<dyn Buffer>) -> usize {
    buffer
        .as_any()
        .downcast_ref::<MockBuffer>()
        .map(|b| b.id)
        .unwrap_or(usize::MAX)
}

impl RenderEncoder for MockRenderEncoder {
    fn set_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        let name = pipeline
            .as_any()
            .downcast_ref::<MockPipeline>()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.push(format!("set_pipeline {}", name))
    }

    fn set_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index: u32) -> Result<()> {
        self.push(format!("set_vertex_buffer buffer={} offset={} index={}", buffer_id(buffer), offset, index))
    }

    fn set_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index: u32) -> Result<()> {
        self.push(format!("set_uniform_buffer buffer={} offset={} index={}", buffer_id(buffer), offset, index))
    }

    fn set_cull_mode(&mut self, mode: CullMode) -> Result<()> {
        self.push(format!("set_cull_mode {:?}", mode))
    }

    fn set_fragment_texture(&mut self, texture: Option<&Arc<dyn Texture>>, index: u32) -> Result<()> {
        let name = texture
            .and_then(|t| t.as_any().downcast_ref::<MockTexture>())
            .map(|t| t.name.clone())
            .unwrap_or_else(|| "none".to_string());
        self.push(format!("set_fragment_texture {} index={}", name, index))
    }

    fn set_fragment_sampler(&mut self, _sampler: &SamplerDesc, index: u32) -> Result<()> {
        self.push(format!("set_fragment_sampler index={}", index))
    }

    fn draw(
        &mut self,
        primitive: PrimitiveType,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        self.push(format!(
            "draw {:?} start={} count={} instances={}",
            primitive, vertex_start, vertex_count, instance_count
        ))
    }

    fn end_encoding(self: Box<Self>) -> Result<()> {
        self.push("end_encoding".to_string())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
