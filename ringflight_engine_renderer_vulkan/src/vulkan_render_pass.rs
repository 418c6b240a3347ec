/// VulkanRenderPass - single color attachment render passes, one per load/store combination
///
/// All variants share the same attachment format and subpass, so they are
/// render-pass compatible: one framebuffer (and one pipeline) works with any
/// of them. Drawable images stay in GENERAL layout between passes.

use ringflight_engine::ringflight::render::{ClearColor, LoadAction, StoreAction};
use ringflight_engine::ringflight::Result;
use ringflight_engine::engine_err;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

const LOAD_VARIANTS: usize = 3;
const STORE_VARIANTS: usize = 2;

pub(crate) struct VulkanRenderPass {
    ctx: Arc<GpuContext>,
    format: vk::Format,
    /// Indexed by `variant_index`
    passes: Vec<vk::RenderPass>,
}

impl VulkanRenderPass {
    pub(crate) fn new(ctx: Arc<GpuContext>, format: vk::Format) -> Result<Self> {
        let mut this = Self {
            ctx,
            format,
            passes: Vec::with_capacity(LOAD_VARIANTS * STORE_VARIANTS),
        };
        // Built in variant_index order; a failure drops what was created so far
        for load in [LoadAction::Load, LoadAction::DontCare, LoadAction::Clear(ClearColor::new(0.0, 0.0, 0.0, 1.0))] {
            for store in [StoreAction::Store, StoreAction::DontCare] {
                let pass = create_render_pass(&this.ctx.device, format, &load, store)?;
                this.passes.push(pass);
            }
        }
        Ok(this)
    }

    pub(crate) fn format(&self) -> vk::Format {
        self.format
    }

    /// The variant pipelines and framebuffers are created against
    pub(crate) fn compatible(&self) -> vk::RenderPass {
        self.passes[0]
    }

    pub(crate) fn get(&self, load: &LoadAction, store: StoreAction) -> vk::RenderPass {
        self.passes[variant_index(load, store)]
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        for pass in self.passes.drain(..) {
            unsafe { self.ctx.device.destroy_render_pass(pass, None) };
        }
    }
}

fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
    load: &LoadAction,
    store: StoreAction,
) -> Result<vk::RenderPass> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op_to_vk(load))
        .store_op(store_op_to_vk(store))
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(initial_layout(load))
        .final_layout(vk::ImageLayout::GENERAL)];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    // Previous frame's writes to the same image finish before this pass touches it
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| engine_err!("ringflight::vulkan::RenderPass", "Failed to create render pass: {:?}", e))
    }
}

pub(crate) fn variant_index(load: &LoadAction, store: StoreAction) -> usize {
    let load = match load {
        LoadAction::Load => 0,
        LoadAction::DontCare => 1,
        LoadAction::Clear(_) => 2,
    };
    let store = match store {
        StoreAction::Store => 0,
        StoreAction::DontCare => 1,
    };
    load * STORE_VARIANTS + store
}

pub(crate) fn load_op_to_vk(load: &LoadAction) -> vk::AttachmentLoadOp {
    match load {
        LoadAction::Load => vk::AttachmentLoadOp::LOAD,
        LoadAction::Clear(_) => vk::AttachmentLoadOp::CLEAR,
        LoadAction::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub(crate) fn store_op_to_vk(store: StoreAction) -> vk::AttachmentStoreOp {
    match store {
        StoreAction::Store => vk::AttachmentStoreOp::STORE,
        StoreAction::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

/// Only a loading pass needs the previous contents (and so the real layout)
pub(crate) fn initial_layout(load: &LoadAction) -> vk::ImageLayout {
    match load {
        LoadAction::Load => vk::ImageLayout::GENERAL,
        _ => vk::ImageLayout::UNDEFINED,
    }
}

pub(crate) fn clear_value(load: &LoadAction) -> vk::ClearValue {
    let float32 = match load {
        LoadAction::Clear(color) => color.to_array(),
        _ => [0.0; 4],
    };
    vk::ClearValue {
        color: vk::ClearColorValue { float32 },
    }
}
