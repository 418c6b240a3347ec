/// VulkanCommandQueue - command buffer submission with completion handlers
///
/// Every command buffer is paired with a fence. Submitted buffers are handed
/// to a completion thread that waits for their fences in submission order,
/// releases whatever the buffer kept alive, runs the completion handlers
/// and recycles the command buffer/fence pair.
///
/// Command buffers of one queue are recorded from one thread at a time: the
/// command pool is only externally synchronized for allocation and reset.

use ringflight_engine::ringflight::render::{
    CommandBuffer, CommandQueue, CompletionHandler, Drawable, RenderEncoder, RenderPassDesc,
};
use ringflight_engine::ringflight::{Error, Result};
use ringflight_engine::{engine_bail, engine_debug, engine_err, engine_error, engine_warn};
use ash::vk;
use std::any::Any;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::vulkan_context::GpuContext;
use crate::vulkan_offscreen_surface::VulkanDrawable;
use crate::vulkan_render_encoder::VulkanRenderEncoder;
use crate::vulkan_render_pass::clear_value;
use crate::vulkan_sampler::SamplerCache;

const SOURCE: &str = "ringflight::vulkan::CommandQueue";

/// Resources a command buffer keeps alive until the GPU finished with it
pub(crate) type Retained = Arc<Mutex<Vec<Box<dyn Any + Send>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A submitted command buffer waiting for its fence
struct InFlight {
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    handlers: Vec<CompletionHandler>,
    retained: Vec<Box<dyn Any + Send>>,
}

impl InFlight {
    /// Wait for the GPU, then drop the retained resources and run the handlers
    ///
    /// Retained drawables go first: a handler may wake a producer that asks
    /// the surface for the very drawable this buffer still holds.
    fn complete(self, ctx: &GpuContext) -> (vk::CommandBuffer, vk::Fence) {
        let waited = unsafe { ctx.device.wait_for_fences(&[self.fence], true, u64::MAX) };
        if let Err(e) = waited {
            // Handlers still run: holding their slots forever would stall the producer
            engine_error!(SOURCE, "Failed to wait for command buffer fence: {:?}", e);
        }
        drop(self.retained);
        for handler in self.handlers {
            handler();
        }
        (self.cmd, self.fence)
    }
}

/// State shared by the queue, its command buffers and the completion thread
struct QueueShared {
    ctx: Arc<GpuContext>,
    pool: Mutex<vk::CommandPool>,
    fences: Mutex<Vec<vk::Fence>>,
    recycled: Mutex<Vec<(vk::CommandBuffer, vk::Fence)>>,
    sender: Mutex<Option<Sender<InFlight>>>,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl QueueShared {
    fn finished(&self, pair: (vk::CommandBuffer, vk::Fence)) {
        lock(&self.recycled).push(pair);
        let mut in_flight = lock(&self.in_flight);
        *in_flight -= 1;
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }

    /// A recording-ready command buffer, reusing a finished one if possible
    unsafe fn begin(&self) -> Result<(vk::CommandBuffer, vk::Fence)> {
        let device = &self.ctx.device;
        let pool = lock(&self.pool);

        let recycled = lock(&self.recycled).pop();
        let (cmd, fence) = match recycled {
            Some((cmd, fence)) => {
                device
                    .reset_fences(&[fence])
                    .map_err(|e| engine_err!(SOURCE, "Failed to reset fence: {:?}", e))?;
                device
                    .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                    .map_err(|e| engine_err!(SOURCE, "Failed to reset command buffer: {:?}", e))?;
                (cmd, fence)
            }
            None => {
                let alloc_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(*pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                let cmd = device
                    .allocate_command_buffers(&alloc_info)
                    .map_err(|e| engine_err!(SOURCE, "Failed to allocate command buffer: {:?}", e))?[0];
                let fence = device
                    .create_fence(&vk::FenceCreateInfo::default(), None)
                    .map_err(|e| engine_err!(SOURCE, "Failed to create fence: {:?}", e))?;
                lock(&self.fences).push(fence);
                (cmd, fence)
            }
        };

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(e) = device.begin_command_buffer(cmd, &begin_info) {
            lock(&self.recycled).push((cmd, fence));
            engine_bail!(SOURCE, "Failed to begin command buffer: {:?}", e);
        }
        Ok((cmd, fence))
    }
}

impl Drop for QueueShared {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            for fence in lock(&self.fences).drain(..) {
                device.destroy_fence(fence, None);
            }
            // Frees every command buffer allocated from it
            device.destroy_command_pool(*lock(&self.pool), None);
        }
    }
}

fn completion_thread(shared: Arc<QueueShared>, receiver: Receiver<InFlight>) {
    for job in receiver {
        let pair = job.complete(&shared.ctx);
        shared.finished(pair);
    }
}

/// In-order submission queue on the device's graphics queue
pub struct VulkanCommandQueue {
    shared: Arc<QueueShared>,
    sampler_cache: Arc<Mutex<SamplerCache>>,
    worker: Option<JoinHandle<()>>,
}

impl VulkanCommandQueue {
    pub(crate) fn new(ctx: Arc<GpuContext>, sampler_cache: Arc<Mutex<SamplerCache>>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.graphics_queue_family);
        let pool = unsafe {
            ctx.device
                .create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create command pool: {:?}", e))?
        };

        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(QueueShared {
            ctx,
            pool: Mutex::new(pool),
            fences: Mutex::new(Vec::new()),
            recycled: Mutex::new(Vec::new()),
            sender: Mutex::new(Some(sender)),
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
        });

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("ringflight-vk-completion".to_string())
                .spawn(move || completion_thread(shared, receiver))
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to spawn completion thread: {}", e);
                    Error::InitializationFailed(format!("Failed to spawn completion thread: {}", e))
                })?
        };

        engine_debug!(SOURCE, "command queue created");

        Ok(Self {
            shared,
            sampler_cache,
            worker: Some(worker),
        })
    }

    /// Submitted command buffers whose handlers have not run yet
    pub fn in_flight(&self) -> usize {
        *lock(&self.shared.in_flight)
    }

    /// Block until every submitted command buffer completed and its handlers ran
    pub fn wait_until_completed(&self) {
        let mut in_flight = lock(&self.shared.in_flight);
        while *in_flight > 0 {
            in_flight = self
                .shared
                .idle
                .wait(in_flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl CommandQueue for VulkanCommandQueue {
    fn command_buffer(&self) -> Option<Box<dyn CommandBuffer>> {
        // Errors are logged by begin(); the caller skips the frame
        let (cmd, fence) = unsafe { self.shared.begin().ok()? };
        Some(Box::new(VulkanCommandBuffer {
            shared: self.shared.clone(),
            sampler_cache: self.sampler_cache.clone(),
            cmd,
            fence,
            handlers: Vec::new(),
            retained: Arc::new(Mutex::new(Vec::new())),
            submitted: false,
        }))
    }
}

impl Drop for VulkanCommandQueue {
    fn drop(&mut self) {
        // Closing the channel lets the completion thread drain what is queued
        lock(&self.shared.sender).take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                engine_error!(SOURCE, "completion thread panicked");
            }
        }
    }
}

/// One frame's worth of recorded work
pub struct VulkanCommandBuffer {
    shared: Arc<QueueShared>,
    sampler_cache: Arc<Mutex<SamplerCache>>,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    handlers: Vec<CompletionHandler>,
    retained: Retained,
    submitted: bool,
}

impl VulkanCommandBuffer {
    fn retain<T: Any + Send>(&self, resource: T) {
        lock(&self.retained).push(Box::new(resource));
    }

    unsafe fn submit(&mut self) -> Result<()> {
        let device = &self.shared.ctx.device;
        device
            .end_command_buffer(self.cmd)
            .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer: {:?}", e))?;

        let command_buffers = [self.cmd];
        let submit = [vk::SubmitInfo::default().command_buffers(&command_buffers)];
        let queue = self.shared.ctx.queue();
        device
            .queue_submit(*queue, &submit, self.fence)
            .map_err(|e| engine_err!(SOURCE, "Failed to submit command buffer: {:?}", e))
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn render_encoder(&mut self, desc: &RenderPassDesc) -> Option<Box<dyn RenderEncoder>> {
        let Some(drawable) = desc.drawable.as_any().downcast_ref::<VulkanDrawable>() else {
            engine_warn!(SOURCE, "drawable was not created by this backend");
            return None;
        };

        let extent = drawable.extent();
        let clear_values = [clear_value(&desc.load_action)];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(drawable.render_pass.get(&desc.load_action, desc.store_action))
            .framebuffer(drawable.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let device = &self.shared.ctx.device;
        unsafe {
            device.cmd_begin_render_pass(self.cmd, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            device.cmd_set_scissor(self.cmd, 0, &[scissor]);
        }
        self.retain(desc.drawable.clone());

        Some(Box::new(VulkanRenderEncoder::new(
            self.shared.ctx.clone(),
            self.cmd,
            self.retained.clone(),
            self.sampler_cache.clone(),
        )))
    }

    fn add_completed_handler(&mut self, handler: CompletionHandler) {
        self.handlers.push(handler);
    }

    /// Offscreen drawables need no presentation; the drawable is kept busy
    /// until this buffer completes.
    fn present(&mut self, drawable: &Arc<dyn Drawable>) {
        self.retain(drawable.clone());
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        // On error, Drop recycles the buffer and drops the handlers unrun
        unsafe { self.submit()? };
        self.submitted = true;
        *lock(&self.shared.in_flight) += 1;

        let job = InFlight {
            cmd: self.cmd,
            fence: self.fence,
            handlers: std::mem::take(&mut self.handlers),
            retained: std::mem::take(&mut *lock(&self.retained)),
        };

        let sender = lock(&self.shared.sender).clone();
        let job = match sender {
            Some(sender) => match sender.send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::SendError(job)) => job,
            },
            None => job,
        };

        // Queue is shutting down: complete inline
        engine_warn!(SOURCE, "completion thread gone, waiting for the GPU inline");
        let pair = job.complete(&self.shared.ctx);
        self.shared.finished(pair);
        Ok(())
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        if !self.submitted {
            // Never reached the GPU: handlers are dropped without running,
            // after the drawables so a woken producer finds them free
            lock(&self.retained).clear();
            self.handlers.clear();
            lock(&self.shared.recycled).push((self.cmd, self.fence));
        }
    }
}
