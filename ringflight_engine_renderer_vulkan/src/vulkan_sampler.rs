/// SamplerCache - VkSampler objects keyed by sampler description
///
/// Creates samplers on first use and keeps them until the cache is dropped.
/// A scene only ever uses a handful of descriptions, so lookup is linear.

use ringflight_engine::ringflight::render::{SamplerAddressMode, SamplerDesc, SamplerFilter};
use ringflight_engine::ringflight::Result;
use ringflight_engine::engine_err;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

pub(crate) struct SamplerCache {
    ctx: Arc<GpuContext>,
    anisotropy_supported: bool,
    cache: Vec<(SamplerDesc, vk::Sampler)>,
}

impl SamplerCache {
    pub(crate) fn new(ctx: Arc<GpuContext>, anisotropy_supported: bool) -> Self {
        Self {
            ctx,
            anisotropy_supported,
            cache: Vec::new(),
        }
    }

    /// Get or create the VkSampler for `desc`
    pub(crate) fn get(&mut self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        if let Some((_, sampler)) = self.cache.iter().find(|(cached, _)| cached == desc) {
            return Ok(*sampler);
        }

        let create_info = sampler_create_info(desc, self.anisotropy_supported);
        let sampler = unsafe {
            self.ctx
                .device
                .create_sampler(&create_info, None)
                .map_err(|e| engine_err!("ringflight::vulkan::SamplerCache", "Failed to create sampler: {:?}", e))?
        };
        self.cache.push((*desc, sampler));
        Ok(sampler)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for SamplerCache {
    fn drop(&mut self) {
        for (_, sampler) in self.cache.drain(..) {
            unsafe { self.ctx.device.destroy_sampler(sampler, None) };
        }
    }
}

pub(crate) fn sampler_create_info(desc: &SamplerDesc, anisotropy_supported: bool) -> vk::SamplerCreateInfo<'static> {
    let anisotropy = anisotropy_supported && desc.max_anisotropy > 1;
    vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(desc.mag_filter))
        .min_filter(filter_to_vk(desc.min_filter))
        .mipmap_mode(mipmap_mode_to_vk(desc.mip_filter))
        .address_mode_u(address_mode_to_vk(desc.address_mode_u))
        .address_mode_v(address_mode_to_vk(desc.address_mode_v))
        .address_mode_w(address_mode_to_vk(desc.address_mode_w))
        .mip_lod_bias(0.0)
        .min_lod(desc.lod_min_clamp)
        .max_lod(desc.lod_max_clamp.min(vk::LOD_CLAMP_NONE))
        .anisotropy_enable(anisotropy)
        .max_anisotropy(if anisotropy { desc.max_anisotropy as f32 } else { 1.0 })
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .unnormalized_coordinates(!desc.normalized_coordinates)
}

pub(crate) fn filter_to_vk(filter: SamplerFilter) -> vk::Filter {
    match filter {
        SamplerFilter::Nearest => vk::Filter::NEAREST,
        SamplerFilter::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn mipmap_mode_to_vk(filter: SamplerFilter) -> vk::SamplerMipmapMode {
    match filter {
        SamplerFilter::Nearest => vk::SamplerMipmapMode::NEAREST,
        SamplerFilter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}
