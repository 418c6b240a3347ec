/// VulkanOffscreenSurface - fixed ring of color images used as drawables
///
/// Headless stand-in for a window swapchain. A drawable is handed out again
/// only once no command buffer retains it, so a surface of N images also
/// bounds the GPU to N frames in flight.

use ringflight_engine::ringflight::render::{Drawable, Surface};
use ringflight_engine::ringflight::{Error, Result};
use ringflight_engine::{engine_debug, engine_err, engine_error};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_render_pass::VulkanRenderPass;

const SOURCE: &str = "ringflight::vulkan::OffscreenSurface";

/// Color format of every offscreen image
pub const OFFSCREEN_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// One offscreen color image with its view and framebuffer
pub struct VulkanDrawable {
    ctx: Arc<GpuContext>,
    pub(crate) render_pass: Arc<VulkanRenderPass>,
    image: vk::Image,
    view: vk::ImageView,
    pub(crate) framebuffer: vk::Framebuffer,
    allocation: Option<Allocation>,
    width: u32,
    height: u32,
    index: usize,
}

impl VulkanDrawable {
    fn new(
        ctx: Arc<GpuContext>,
        render_pass: Arc<VulkanRenderPass>,
        width: u32,
        height: u32,
        index: usize,
    ) -> Result<Self> {
        let mut this = Self {
            ctx,
            render_pass,
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            framebuffer: vk::Framebuffer::null(),
            allocation: None,
            width,
            height,
            index,
        };
        // Partially built drawables are cleaned up by Drop
        unsafe { this.create_resources()? };
        Ok(this)
    }

    unsafe fn create_resources(&mut self) -> Result<()> {
        let device = &self.ctx.device;
        let format = self.render_pass.format();

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D { width: self.width, height: self.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        self.image = device
            .create_image(&image_info, None)
            .map_err(|e| engine_err!(SOURCE, "Failed to create offscreen image {}: {:?}", self.index, e))?;

        let requirements = device.get_image_memory_requirements(self.image);
        let allocation = self
            .ctx
            .allocator()
            .allocate(&AllocationCreateDesc {
                name: "offscreen_color",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                engine_error!(SOURCE, "Out of GPU memory for offscreen image {}: {}", self.index, e);
                Error::OutOfMemory
            })?;
        let (memory, offset) = (allocation.memory(), allocation.offset());
        self.allocation = Some(allocation);

        device
            .bind_image_memory(self.image, memory, offset)
            .map_err(|e| engine_err!(SOURCE, "Failed to bind offscreen image memory: {:?}", e))?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_range());
        self.view = device
            .create_image_view(&view_info, None)
            .map_err(|e| engine_err!(SOURCE, "Failed to create offscreen image view: {:?}", e))?;

        let attachments = [self.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(self.render_pass.compatible())
            .attachments(&attachments)
            .width(self.width)
            .height(self.height)
            .layers(1);
        self.framebuffer = device
            .create_framebuffer(&framebuffer_info, None)
            .map_err(|e| engine_err!(SOURCE, "Failed to create framebuffer: {:?}", e))?;

        Ok(())
    }

    /// Position in the surface ring
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub(crate) fn extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.width, height: self.height }
    }
}

impl Drawable for VulkanDrawable {
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

impl Drop for VulkanDrawable {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            if self.framebuffer != vk::Framebuffer::null() {
                device.destroy_framebuffer(self.framebuffer, None);
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            if self.image != vk::Image::null() {
                device.destroy_image(self.image, None);
            }
        }
        if let Some(allocation) = self.allocation.take() {
            self.ctx.allocator().free(allocation).ok();
        }
    }
}

/// Ring of offscreen drawables
pub struct VulkanOffscreenSurface {
    render_pass: Arc<VulkanRenderPass>,
    drawables: Vec<Arc<VulkanDrawable>>,
    cursor: AtomicUsize,
}

impl VulkanOffscreenSurface {
    pub(crate) fn new(ctx: Arc<GpuContext>, width: u32, height: u32, image_count: usize) -> Result<Self> {
        if width == 0 || height == 0 || image_count == 0 {
            return Err(Error::InvalidConfig(format!(
                "offscreen surface needs a non-empty extent and at least one image, got {}x{} x{}",
                width, height, image_count
            )));
        }

        let render_pass = Arc::new(VulkanRenderPass::new(ctx.clone(), OFFSCREEN_FORMAT)?);
        let drawables = (0..image_count)
            .map(|index| VulkanDrawable::new(ctx.clone(), render_pass.clone(), width, height, index).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let images: Vec<vk::Image> = drawables.iter().map(|d| d.image).collect();
        unsafe { transition_to_general(&ctx, &images)? };

        engine_debug!(SOURCE, "created {} images of {}x{}", image_count, width, height);

        Ok(Self {
            render_pass,
            drawables,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Render pass pipelines must be compatible with
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.compatible()
    }

    pub fn format(&self) -> vk::Format {
        self.render_pass.format()
    }

    pub fn image_count(&self) -> usize {
        self.drawables.len()
    }

    /// Drawables not currently retained by any command buffer or caller
    pub fn idle_count(&self) -> usize {
        self.drawables.iter().filter(|d| Arc::strong_count(d) == 1).count()
    }
}

impl Surface for VulkanOffscreenSurface {
    fn next_drawable(&self) -> Option<Arc<dyn Drawable>> {
        let count = self.drawables.len();
        let start = self.cursor.load(Ordering::Acquire);
        for step in 0..count {
            let index = (start + step) % count;
            let drawable = &self.drawables[index];
            if Arc::strong_count(drawable) == 1 {
                self.cursor.store((index + 1) % count, Ordering::Release);
                return Some(drawable.clone());
            }
        }
        None
    }
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Move fresh images into GENERAL so a loading pass finds a defined layout
unsafe fn transition_to_general(ctx: &GpuContext, images: &[vk::Image]) -> Result<()> {
    let device = &ctx.device;

    let pool_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::TRANSIENT)
        .queue_family_index(ctx.graphics_queue_family);
    let pool = device
        .create_command_pool(&pool_info, None)
        .map_err(|e| engine_err!(SOURCE, "Failed to create transition command pool: {:?}", e))?;

    let result = (|| {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| engine_err!(SOURCE, "Failed to allocate transition command buffer: {:?}", e))?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| engine_err!(SOURCE, "Failed to begin transition command buffer: {:?}", e))?;

        let barriers: Vec<vk::ImageMemoryBarrier> = images
            .iter()
            .map(|&image| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::GENERAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(color_range())
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            })
            .collect();

        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &barriers,
        );

        device
            .end_command_buffer(cmd)
            .map_err(|e| engine_err!(SOURCE, "Failed to end transition command buffer: {:?}", e))?;

        let command_buffers = [cmd];
        let submit = [vk::SubmitInfo::default().command_buffers(&command_buffers)];
        let queue = ctx.queue();
        device
            .queue_submit(*queue, &submit, vk::Fence::null())
            .map_err(|e| engine_err!(SOURCE, "Failed to submit layout transition: {:?}", e))?;
        device
            .queue_wait_idle(*queue)
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for layout transition: {:?}", e))
    })();

    device.destroy_command_pool(pool, None);
    result
}
