/// VulkanPipeline - wraps an externally built graphics pipeline
///
/// Pipelines used with this backend must:
/// - be compatible with the render pass from `VulkanOffscreenSurface::render_pass`
/// - declare every state in `REQUIRED_DYNAMIC_STATES` as dynamic
/// - use a layout whose set 0 is `VulkanGraphicsDevice::descriptor_set_layout`

use ringflight_engine::ringflight::render::Pipeline;
use ash::vk;
use std::any::Any;

/// Dynamic states the render encoder sets on every pass
pub const REQUIRED_DYNAMIC_STATES: [vk::DynamicState; 4] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::CULL_MODE,
    vk::DynamicState::PRIMITIVE_TOPOLOGY,
];

/// Not owned: the caller destroys the pipeline and layout after the last
/// frame using them completed.
pub struct VulkanPipeline {
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
}

impl VulkanPipeline {
    pub fn from_raw(pipeline: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        Self { pipeline, layout }
    }
}

impl Pipeline for VulkanPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
