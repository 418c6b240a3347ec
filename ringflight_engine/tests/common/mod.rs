//! Host-memory backend shared by the integration tests
//!
//! A background thread plays the GPU: it executes committed command buffers
//! in commit order after a fixed latency, checks that every uniform slot
//! still holds the bytes it had when the draw was encoded, then runs the
//! completion handlers.

#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringflight_engine::ringflight::render::*;
use ringflight_engine::ringflight::{Error, GraphicsDevice, Result};

// ============================================================================
// Device / buffers
// ============================================================================

pub struct HostBuffer {
    data: Mutex<Vec<u8>>,
}

impl Buffer for HostBuffer {
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.data.lock().unwrap();
        check_buffer_range(bytes.len() as u64, offset, data.len())?;
        bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let bytes = self.data.lock().unwrap();
        check_buffer_range(bytes.len() as u64, offset, out.len())?;
        out.copy_from_slice(&bytes[offset as usize..offset as usize + out.len()]);
        Ok(())
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        Some(self.data.lock().unwrap().as_mut_ptr())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl HostBuffer {
    fn snapshot(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct HostDevice {
    pub allocations: AtomicUsize,
}

impl GraphicsDevice for HostDevice {
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(HostBuffer {
            data: Mutex::new(vec![0u8; desc.size as usize]),
        }))
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}

pub struct HostPipeline;

impl Pipeline for HostPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct HostDrawable;

impl Drawable for HostDrawable {
    fn width(&self) -> u32 {
        640
    }

    fn height(&self) -> u32 {
        480
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct HostSurface;

impl Surface for HostSurface {
    fn next_drawable(&self) -> Option<Arc<dyn Drawable>> {
        Some(Arc::new(HostDrawable))
    }
}

// ============================================================================
// Queue with a GPU thread
// ============================================================================

/// Uniform buffer bound by a draw, with its contents at encode time
type Binding = (Arc<dyn Buffer>, Vec<u8>);

struct Submission {
    bindings: Vec<Binding>,
    handlers: Vec<CompletionHandler>,
}

#[derive(Default)]
pub struct GpuStats {
    /// Command buffers executed
    pub executed: AtomicUsize,
    /// Uniform slots overwritten before the GPU read them
    pub corrupted: AtomicUsize,
}

pub struct ThreadedQueue {
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    pub stats: Arc<GpuStats>,
}

impl ThreadedQueue {
    pub fn new(latency: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        let stats = Arc::new(GpuStats::default());
        let worker = {
            let stats = stats.clone();
            thread::spawn(move || gpu_thread(receiver, latency, stats))
        };
        Self {
            sender: Some(sender),
            worker: Some(worker),
            stats,
        }
    }
}

fn gpu_thread(receiver: Receiver<Submission>, latency: Duration, stats: Arc<GpuStats>) {
    for submission in receiver {
        thread::sleep(latency);
        for (buffer, expected) in &submission.bindings {
            let host = buffer.as_any().downcast_ref::<HostBuffer>();
            if host.map(|b| b.snapshot()) != Some(expected.clone()) {
                stats.corrupted.fetch_add(1, Ordering::SeqCst);
            }
        }
        stats.executed.fetch_add(1, Ordering::SeqCst);
        for handler in submission.handlers {
            handler();
        }
    }
}

impl Drop for ThreadedQueue {
    fn drop(&mut self) {
        // Closing the channel lets the GPU thread finish what is queued
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl CommandQueue for ThreadedQueue {
    fn command_buffer(&self) -> Option<Box<dyn CommandBuffer>> {
        let sender = self.sender.as_ref()?.clone();
        Some(Box::new(HostCommandBuffer {
            sender,
            bindings: Arc::new(Mutex::new(Vec::new())),
            handlers: Vec::new(),
        }))
    }
}

struct HostCommandBuffer {
    sender: Sender<Submission>,
    bindings: Arc<Mutex<Vec<Binding>>>,
    handlers: Vec<CompletionHandler>,
}

impl CommandBuffer for HostCommandBuffer {
    fn render_encoder(&mut self, _desc: &RenderPassDesc) -> Option<Box<dyn RenderEncoder>> {
        Some(Box::new(HostEncoder {
            bindings: self.bindings.clone(),
        }))
    }

    fn add_completed_handler(&mut self, handler: CompletionHandler) {
        self.handlers.push(handler);
    }

    fn present(&mut self, _drawable: &Arc<dyn Drawable>) {}

    fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let bindings = std::mem::take(&mut *this.bindings.lock().unwrap());
        this.sender
            .send(Submission {
                bindings,
                handlers: this.handlers,
            })
            .map_err(|_| Error::BackendError("GPU thread gone".to_string()))
    }
}

struct HostEncoder {
    bindings: Arc<Mutex<Vec<Binding>>>,
}

impl RenderEncoder for HostEncoder {
    fn set_pipeline(&mut self, _pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        Ok(())
    }

    fn set_vertex_buffer(&mut self, _buffer: &Arc<dyn Buffer>, _offset: u64, _index: u32) -> Result<()> {
        Ok(())
    }

    fn set_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>, _offset: u64, _index: u32) -> Result<()> {
        let snapshot = buffer
            .as_any()
            .downcast_ref::<HostBuffer>()
            .map(|b| b.snapshot())
            .unwrap_or_default();
        self.bindings.lock().unwrap().push((buffer.clone(), snapshot));
        Ok(())
    }

    fn set_cull_mode(&mut self, _mode: CullMode) -> Result<()> {
        Ok(())
    }

    fn set_fragment_texture(&mut self, _texture: Option<&Arc<dyn Texture>>, _index: u32) -> Result<()> {
        Ok(())
    }

    fn set_fragment_sampler(&mut self, _sampler: &SamplerDesc, _index: u32) -> Result<()> {
        Ok(())
    }

    fn draw(&mut self, _primitive: PrimitiveType, _start: u32, _count: u32, _instances: u32) -> Result<()> {
        Ok(())
    }

    fn end_encoding(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
