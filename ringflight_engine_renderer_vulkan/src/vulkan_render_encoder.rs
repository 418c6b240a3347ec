/// VulkanRenderEncoder - records one render pass into a command buffer
///
/// Resource bindings go through push descriptors on set 0 of the bound
/// pipeline's layout. Uniform buffer `index` maps to binding `index`;
/// fragment texture and sampler at `index` are combined into the
/// combined-image-sampler at binding `index`. Bindings are flushed lazily
/// at the next draw.

use ringflight_engine::ringflight::render::{
    Buffer, CullMode, Pipeline, PrimitiveType, RenderEncoder, SamplerDesc, Texture,
};
use ringflight_engine::ringflight::{Error, Result};
use ringflight_engine::engine_error;
use ash::vk;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_queue::Retained;
use crate::vulkan_context::GpuContext;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_texture::VulkanTexture;

const SOURCE: &str = "ringflight::vulkan::RenderEncoder";

pub(crate) struct VulkanRenderEncoder {
    ctx: Arc<GpuContext>,
    cmd: vk::CommandBuffer,
    retained: Retained,
    sampler_cache: Arc<Mutex<SamplerCache>>,
    layout: Option<vk::PipelineLayout>,
    uniforms: BTreeMap<u32, vk::DescriptorBufferInfo>,
    textures: BTreeMap<u32, vk::ImageView>,
    samplers: BTreeMap<u32, vk::Sampler>,
    dirty: bool,
    ended: bool,
}

impl VulkanRenderEncoder {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        cmd: vk::CommandBuffer,
        retained: Retained,
        sampler_cache: Arc<Mutex<SamplerCache>>,
    ) -> Self {
        Self {
            ctx,
            cmd,
            retained,
            sampler_cache,
            layout: None,
            uniforms: BTreeMap::new(),
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
            dirty: false,
            ended: false,
        }
    }

    fn retain<T: std::any::Any + Send>(&self, resource: T) {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(resource));
    }

    fn flush_descriptors(&mut self, layout: vk::PipelineLayout) {
        if !self.dirty {
            return;
        }

        let buffer_infos: Vec<(u32, [vk::DescriptorBufferInfo; 1])> = self
            .uniforms
            .iter()
            .map(|(&binding, info)| (binding, [*info]))
            .collect();
        let image_infos: Vec<(u32, [vk::DescriptorImageInfo; 1])> = self
            .textures
            .iter()
            .filter_map(|(&binding, &view)| {
                let sampler = *self.samplers.get(&binding)?;
                Some((
                    binding,
                    [vk::DescriptorImageInfo::default()
                        .sampler(sampler)
                        .image_view(view)
                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)],
                ))
            })
            .collect();

        let mut writes = Vec::with_capacity(buffer_infos.len() + image_infos.len());
        for (binding, info) in &buffer_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info),
            );
        }
        for (binding, info) in &image_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info),
            );
        }

        if !writes.is_empty() {
            unsafe {
                self.ctx.push_descriptor.cmd_push_descriptor_set(
                    self.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    0,
                    &writes,
                );
            }
        }
        self.dirty = false;
    }
}

fn downcast_buffer(buffer: &Arc<dyn Buffer>) -> Result<&VulkanBuffer> {
    buffer.as_any().downcast_ref::<VulkanBuffer>().ok_or_else(|| {
        engine_error!(SOURCE, "buffer was not created by this backend");
        Error::InvalidResource("buffer was not created by this backend".to_string())
    })
}

impl RenderEncoder for VulkanRenderEncoder {
    fn set_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        let vk_pipeline = pipeline.as_any().downcast_ref::<VulkanPipeline>().ok_or_else(|| {
            engine_error!(SOURCE, "pipeline was not created by this backend");
            Error::InvalidResource("pipeline was not created by this backend".to_string())
        })?;

        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, vk_pipeline.pipeline);
        }
        // A new layout starts with no pushed descriptors
        if self.layout != Some(vk_pipeline.layout) {
            self.layout = Some(vk_pipeline.layout);
            self.dirty = true;
        }
        self.retain(pipeline.clone());
        Ok(())
    }

    fn set_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index: u32) -> Result<()> {
        let vk_buffer = downcast_buffer(buffer)?;
        unsafe {
            self.ctx
                .device
                .cmd_bind_vertex_buffers(self.cmd, index, &[vk_buffer.buffer], &[offset]);
        }
        self.retain(buffer.clone());
        Ok(())
    }

    fn set_uniform_buffer(&mut self, buffer: &Arc<dyn Buffer>, offset: u64, index: u32) -> Result<()> {
        let vk_buffer = downcast_buffer(buffer)?;
        let info = vk::DescriptorBufferInfo::default()
            .buffer(vk_buffer.buffer)
            .offset(offset)
            .range(vk::WHOLE_SIZE);
        self.uniforms.insert(index, info);
        self.dirty = true;
        self.retain(buffer.clone());
        Ok(())
    }

    fn set_cull_mode(&mut self, mode: CullMode) -> Result<()> {
        unsafe { self.ctx.device.cmd_set_cull_mode(self.cmd, cull_mode_to_vk(mode)) };
        Ok(())
    }

    fn set_fragment_texture(&mut self, texture: Option<&Arc<dyn Texture>>, index: u32) -> Result<()> {
        match texture {
            Some(texture) => {
                let vk_texture = texture.as_any().downcast_ref::<VulkanTexture>().ok_or_else(|| {
                    engine_error!(SOURCE, "texture was not created by this backend");
                    Error::InvalidResource("texture was not created by this backend".to_string())
                })?;
                self.textures.insert(index, vk_texture.view);
                self.retain(texture.clone());
            }
            None => {
                self.textures.remove(&index);
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn set_fragment_sampler(&mut self, sampler: &SamplerDesc, index: u32) -> Result<()> {
        let vk_sampler = self
            .sampler_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sampler)?;
        self.samplers.insert(index, vk_sampler);
        self.dirty = true;
        Ok(())
    }

    fn draw(
        &mut self,
        primitive: PrimitiveType,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        let layout = self.layout.ok_or_else(|| {
            engine_error!(SOURCE, "draw recorded before any pipeline was bound");
            Error::InvalidResource("no pipeline bound".to_string())
        })?;

        self.flush_descriptors(layout);
        unsafe {
            let device = &self.ctx.device;
            device.cmd_set_primitive_topology(self.cmd, primitive_to_vk(primitive));
            device.cmd_draw(self.cmd, vertex_count, instance_count, vertex_start, 0);
        }
        Ok(())
    }

    fn end_encoding(mut self: Box<Self>) -> Result<()> {
        unsafe { self.ctx.device.cmd_end_render_pass(self.cmd) };
        self.ended = true;
        Ok(())
    }
}

impl Drop for VulkanRenderEncoder {
    fn drop(&mut self) {
        // Keep the command buffer valid for submission
        if !self.ended {
            unsafe { self.ctx.device.cmd_end_render_pass(self.cmd) };
        }
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn primitive_to_vk(primitive: PrimitiveType) -> vk::PrimitiveTopology {
    match primitive {
        PrimitiveType::Point => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::Line => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}
